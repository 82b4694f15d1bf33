//! Error types for `cadence-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Machine-checkable discriminator shared by every error type in the
/// workspace. Serialised in snake_case for JSON results.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  DuplicateName,
  NotFound,
  InvalidState,
  Validation,
  EmptySource,
  NoActiveCampaign,
  NoDuePost,
  UploadFailed,
  PublishFailed,
  /// Transport failure while fetching a feed, page or media file.
  Fetch,
  /// Backend fault not attributable to the caller.
  Storage,
}

/// Implemented by every error type so that callers can classify errors from
/// any backend without knowing its concrete type.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("campaign name already exists: {0:?}")]
  DuplicateName(String),

  #[error("campaign not found: {0}")]
  CampaignNotFound(Uuid),

  #[error("no campaign named {0:?}")]
  CampaignNameNotFound(String),

  #[error("post not found: {0}")]
  PostNotFound(Uuid),

  #[error("invalid state: {0}")]
  InvalidState(String),

  #[error("validation error: {0}")]
  Validation(String),

  #[error("source contained no valid records")]
  EmptySource,

  #[error("no active campaign")]
  NoActiveCampaign,

  #[error("no post is due for the {0} slot")]
  NoDuePost(crate::post::Slot),

  #[error("media upload failed: {0}")]
  UploadFailed(String),

  #[error("publish failed: {0}")]
  PublishFailed(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  pub fn invalid_state(msg: impl Into<String>) -> Self {
    Self::InvalidState(msg.into())
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::DuplicateName(_) => ErrorKind::DuplicateName,
      Self::CampaignNotFound(_) | Self::CampaignNameNotFound(_) | Self::PostNotFound(_) => {
        ErrorKind::NotFound
      }
      Self::InvalidState(_) => ErrorKind::InvalidState,
      Self::Validation(_) => ErrorKind::Validation,
      Self::EmptySource => ErrorKind::EmptySource,
      Self::NoActiveCampaign => ErrorKind::NoActiveCampaign,
      Self::NoDuePost(_) => ErrorKind::NoDuePost,
      Self::UploadFailed(_) => ErrorKind::UploadFailed,
      Self::PublishFailed(_) => ErrorKind::PublishFailed,
      Self::Serialization(_) => ErrorKind::Storage,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_serialises_snake_case() {
    let json = serde_json::to_string(&ErrorKind::NoActiveCampaign).unwrap();
    assert_eq!(json, "\"no_active_campaign\"");
    assert_eq!(ErrorKind::NoDuePost.to_string(), "no_due_post");
  }

  #[test]
  fn not_found_variants_share_a_kind() {
    assert_eq!(Error::CampaignNotFound(Uuid::nil()).kind(), ErrorKind::NotFound);
    assert_eq!(Error::PostNotFound(Uuid::nil()).kind(), ErrorKind::NotFound);
    assert_eq!(Error::CampaignNameNotFound("Q1".into()).kind(), ErrorKind::NotFound);
  }
}
