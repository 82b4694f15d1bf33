//! The social-network capability consumed by the publisher.

use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The authenticated account behind a network client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id:     String,
  pub handle: String,
  pub name:   Option<String>,
}

/// A media file ready to be uploaded.
#[derive(Debug, Clone)]
pub struct MediaUpload {
  pub data:       Bytes,
  /// MIME type, e.g. `image/png`.
  pub media_type: String,
  pub alt_text:   Option<String>,
}

/// Abstraction over a social network account that can publish posts.
pub trait SocialNetwork: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Confirm the credentials and return the account they belong to.
  fn verify(&self) -> impl Future<Output = Result<Identity, Self::Error>> + Send + '_;

  /// Upload one media file and return its network media id.
  fn upload_media(
    &self,
    media: MediaUpload,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Publish `text` with already-uploaded `media_ids` attached and return
  /// the network's id for the new post.
  fn post_text<'a>(
    &'a self,
    text: &'a str,
    media_ids: &'a [String],
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;
}
