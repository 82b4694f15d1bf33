//! Media resolution for publishing: downloads, type detection and the
//! fallback-image chain.

use std::{sync::LazyLock, time::Duration};

use bytes::Bytes;
use cadence_core::campaign::Campaign;
use regex::Regex;
use reqwest::Client;
use url::Url;

use crate::{Error, Result, config::MediaConfig, fetch::get_capped};

/// Pages larger than this are not scanned for an `og:image` tag.
const OG_PAGE_MAX_BYTES: u64 = 2 * 1024 * 1024;

const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

static OG_PROPERTY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"(?is)<meta[^>]+property\s*=\s*["']og:image(?::url)?["'][^>]*?content\s*=\s*["']([^"']+)["']"#,
  )
  .expect("literal regex")
});

static OG_CONTENT_FIRST: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*?property\s*=\s*["']og:image(?::url)?["']"#,
  )
  .expect("literal regex")
});

/// A media file fetched for upload.
#[derive(Debug, Clone)]
pub struct Downloaded {
  pub data:       Bytes,
  pub media_type: String,
}

#[derive(Debug, Clone)]
pub struct MediaResolver {
  http:   Client,
  config: MediaConfig,
}

impl MediaResolver {
  pub fn new(config: MediaConfig) -> Result<Self> {
    Ok(Self { http: Client::builder().build()?, config })
  }

  /// The fallback image for a post of `campaign` without explicit media:
  /// the campaign's own image, else the configured default, else the live
  /// `og:image` of the configured site.
  pub async fn fallback_image(&self, campaign: &Campaign) -> Option<String> {
    if let Some(url) = &campaign.fallback_image_url {
      return Some(url.clone());
    }
    if let Some(url) = &self.config.default_fallback_image {
      return Some(url.clone());
    }
    self.og_image().await
  }

  /// Fetch the configured site and extract its `og:image`. Every failure
  /// means "no fallback".
  pub async fn og_image(&self) -> Option<String> {
    let site = self.config.site_url.as_deref()?;
    let url = match Url::parse(site) {
      Ok(url) => url,
      Err(e) => {
        tracing::warn!(site, error = %e, "site_url is not a valid URL");
        return None;
      }
    };

    let timeout = Duration::from_secs(self.config.og_timeout_secs);
    match get_capped(&self.http, &url, OG_PAGE_MAX_BYTES, timeout).await {
      Ok(page) => {
        let found = extract_og_image(&String::from_utf8_lossy(&page.body), &url);
        if found.is_none() {
          tracing::debug!(%url, "site has no og:image");
        }
        found
      }
      Err(e) => {
        tracing::warn!(%url, error = %e, "og:image lookup failed");
        None
      }
    }
  }

  /// Download `raw` for upload, bounded by the download timeout and size
  /// cap.
  pub async fn download(&self, raw: &str) -> Result<Downloaded> {
    let url = cadence_core::post::validate_media_url(raw)?;
    let timeout = Duration::from_secs(self.config.download_timeout_secs);
    let fetched = get_capped(&self.http, &url, self.config.max_download_bytes, timeout).await?;
    Ok(Downloaded {
      media_type: detect_media_type(fetched.content_type.as_deref(), &url),
      data:       fetched.body,
    })
  }
}

/// Extract the `og:image` URL from `html`, resolved against `base`.
pub fn extract_og_image(html: &str, base: &Url) -> Option<String> {
  let raw = OG_PROPERTY_FIRST
    .captures(html)
    .or_else(|| OG_CONTENT_FIRST.captures(html))
    .and_then(|c| c.get(1))
    .map(|m| m.as_str().trim().replace("&amp;", "&"))?;
  base.join(&raw).ok().map(String::from)
}

/// Pick the MIME type for an upload: a declared `image/*` or `video/*`
/// content type wins, then the URL's extension, then `image/jpeg`.
pub fn detect_media_type(content_type: Option<&str>, url: &Url) -> String {
  if let Some(ct) = content_type {
    let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if essence.starts_with("image/") || essence.starts_with("video/") {
      return essence;
    }
  }

  let ext = url
    .path_segments()
    .and_then(|mut s| s.next_back())
    .and_then(|name| name.rsplit_once('.'))
    .map(|(_, ext)| ext.to_ascii_lowercase());
  match ext.as_deref() {
    Some("jpg" | "jpeg") => "image/jpeg",
    Some("png") => "image/png",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    Some("mp4") => "video/mp4",
    _ => DEFAULT_MEDIA_TYPE,
  }
  .to_owned()
}
