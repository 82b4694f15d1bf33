//! X (Twitter) API v2 client implementing [`SocialNetwork`].

use std::time::Duration;

use cadence_core::network::{Identity, MediaUpload, SocialNetwork};
use reqwest::{Client, multipart};
use serde::Deserialize;
use thiserror::Error;

use crate::config::XConfig;

#[derive(Debug, Error)]
pub enum XError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("X API error (status {status}): {body}")]
  Api { status: u16, body: String },

  #[error("unexpected X API response: {0}")]
  Decode(String),

  #[error("{0} uploads are not supported")]
  UnsupportedMedia(String),

  #[error("no X access token configured")]
  MissingToken,
}

#[derive(Debug, Clone)]
pub struct XClient {
  http:         Client,
  api_base:     String,
  access_token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
  data: T,
}

#[derive(Deserialize)]
struct User {
  id:       String,
  name:     Option<String>,
  username: String,
}

#[derive(Deserialize)]
struct Created {
  id: String,
}

impl XClient {
  pub fn new(config: &XConfig) -> Result<Self, XError> {
    let access_token = config
      .access_token
      .clone()
      .filter(|t| !t.trim().is_empty())
      .ok_or(XError::MissingToken)?;
    Ok(Self {
      http: Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?,
      api_base: config.api_base.trim_end_matches('/').to_owned(),
      access_token,
    })
  }

  fn url(&self, path: &str) -> String { format!("{}{path}", self.api_base) }

  fn bearer(&self) -> String { format!("Bearer {}", self.access_token) }

  /// Read a JSON `{"data": ..}` body, mapping non-success statuses to
  /// [`XError::Api`].
  async fn data<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, XError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
      return Err(XError::Api { status: status.as_u16(), body: text });
    }
    serde_json::from_str::<Envelope<T>>(&text)
      .map(|e| e.data)
      .map_err(|e| XError::Decode(format!("{e}; body: {text}")))
  }

  async fn set_alt_text(&self, media_id: &str, alt_text: &str) -> Result<(), XError> {
    let body = serde_json::json!({
      "id": media_id,
      "metadata": { "alt_text": { "text": alt_text } },
    });
    let resp = self
      .http
      .post(self.url("/2/media/metadata"))
      .header("Authorization", self.bearer())
      .json(&body)
      .send()
      .await?;
    let status = resp.status();
    if !status.is_success() {
      let text = resp.text().await?;
      return Err(XError::Api { status: status.as_u16(), body: text });
    }
    Ok(())
  }
}

impl SocialNetwork for XClient {
  type Error = XError;

  async fn verify(&self) -> Result<Identity, XError> {
    let resp = self
      .http
      .get(self.url("/2/users/me"))
      .header("Authorization", self.bearer())
      .send()
      .await?;
    let user: User = Self::data(resp).await?;
    Ok(Identity { id: user.id, handle: user.username, name: user.name })
  }

  async fn upload_media(&self, media: MediaUpload) -> Result<String, XError> {
    // Videos need the chunked upload flow.
    if media.media_type.starts_with("video/") {
      return Err(XError::UnsupportedMedia(media.media_type));
    }
    let category = if media.media_type == "image/gif" { "tweet_gif" } else { "tweet_image" };

    let part = multipart::Part::bytes(media.data.to_vec())
      .mime_str(&media.media_type)
      .map_err(|e| XError::Decode(format!("invalid mime type {}: {e}", media.media_type)))?;
    let form = multipart::Form::new()
      .text("media_category", category)
      .text("media_type", media.media_type.clone())
      .part("media", part);

    let resp = self
      .http
      .post(self.url("/2/media/upload"))
      .header("Authorization", self.bearer())
      .multipart(form)
      .send()
      .await?;
    let created: Created = Self::data(resp).await?;

    if let Some(alt) = media.alt_text.as_deref()
      && let Err(e) = self.set_alt_text(&created.id, alt).await
    {
      tracing::warn!(media_id = %created.id, error = %e, "alt text not applied");
    }
    Ok(created.id)
  }

  async fn post_text(&self, text: &str, media_ids: &[String]) -> Result<String, XError> {
    let mut body = serde_json::json!({ "text": text });
    if !media_ids.is_empty() {
      body["media"] = serde_json::json!({ "media_ids": media_ids });
    }

    let resp = self
      .http
      .post(self.url("/2/tweets"))
      .header("Authorization", self.bearer())
      .json(&body)
      .send()
      .await?;
    let created: Created = Self::data(resp).await?;
    Ok(created.id)
  }
}
