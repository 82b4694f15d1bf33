//! Size-capped HTTP GET shared by feed, page and media downloads.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::{Client, header::CONTENT_TYPE};
use url::Url;

use crate::{Error, Result};

/// A downloaded body and its declared content type.
#[derive(Debug, Clone)]
pub struct Fetched {
  pub body:         Bytes,
  pub content_type: Option<String>,
}

/// GET `url` and read at most `max_bytes` of the body. Non-success statuses
/// are errors. `timeout` bounds the whole exchange, body included.
pub async fn get_capped(
  client: &Client,
  url: &Url,
  max_bytes: u64,
  timeout: Duration,
) -> Result<Fetched> {
  let resp = client.get(url.clone()).timeout(timeout).send().await?;
  let status = resp.status();
  if !status.is_success() {
    return Err(Error::Status { url: url.to_string(), status: status.as_u16() });
  }

  let content_type = resp
    .headers()
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned);
  let body = read_capped(resp, max_bytes).await?;
  Ok(Fetched { body, content_type })
}

/// Read the body of `resp`, failing as soon as it exceeds `max_bytes`.
pub async fn read_capped(mut resp: reqwest::Response, max_bytes: u64) -> Result<Bytes> {
  if let Some(len) = resp.content_length()
    && len > max_bytes
  {
    return Err(Error::TooLarge { max_bytes });
  }

  let mut buf = BytesMut::new();
  while let Some(chunk) = resp.chunk().await? {
    if (buf.len() + chunk.len()) as u64 > max_bytes {
      return Err(Error::TooLarge { max_bytes });
    }
    buf.extend_from_slice(&chunk);
  }
  Ok(buf.freeze())
}
