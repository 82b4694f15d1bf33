//! Where feeds come from: a bundled file on the allow-list, or an HTTPS URL.
//!
//! Both paths are bounded. Local reads are confined to `feed.local_dir` and
//! to the exact names in `feed.allowed_files`. Remote reads must be HTTPS and
//! are capped in size and time.

use std::{path::PathBuf, time::Duration};

use reqwest::{Client, redirect};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result, config::FeedConfig, fetch::get_capped};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "source", rename_all = "lowercase")]
pub enum FeedSource {
  /// A file name from the allow-list.
  Local(String),
  /// An `https://` URL.
  Remote(String),
}

impl FeedSource {
  /// Provenance string stored on every imported post.
  pub fn identifier(&self) -> String {
    match self {
      Self::Local(name) => format!("import:local:{name}"),
      Self::Remote(url) => format!("import:remote:{url}"),
    }
  }
}

/// Redirect hops a remote feed may take before the fetch is abandoned.
pub const MAX_FEED_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct FeedFetcher {
  http:   Client,
  config: FeedConfig,
}

impl FeedFetcher {
  pub fn new(config: FeedConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .redirect(https_only_redirects())
      .build()?;
    Ok(Self { http, config })
  }

  /// Read the feed document named by `source`.
  pub async fn load(&self, source: &FeedSource) -> Result<String> {
    match source {
      FeedSource::Local(name) => self.read_local(name).await,
      FeedSource::Remote(raw) => {
        let url = Url::parse(raw).map_err(|_| Error::InsecureUrl(raw.clone()))?;
        if url.scheme() != "https" || !url.has_host() {
          return Err(Error::InsecureUrl(raw.clone()));
        }
        self.download(&url).await
      }
    }
  }

  /// Resolve `name` against the allow-list. Only bare file names that are
  /// listed verbatim resolve.
  pub fn resolve_local(&self, name: &str) -> Result<PathBuf> {
    let bare = !name.is_empty()
      && !name.contains(['/', '\\'])
      && name != "."
      && name != "..";
    if !bare || !self.config.allowed_files.iter().any(|f| f == name) {
      return Err(Error::NotAllowed(name.to_owned()));
    }
    Ok(self.config.local_dir.join(name))
  }

  async fn read_local(&self, name: &str) -> Result<String> {
    let path = self.resolve_local(name)?;
    let len = tokio::fs::metadata(&path).await?.len();
    if len > self.config.max_bytes {
      return Err(Error::TooLarge { max_bytes: self.config.max_bytes });
    }
    tracing::debug!(path = %path.display(), bytes = len, "reading bundled feed");
    Ok(tokio::fs::read_to_string(&path).await?)
  }

  /// Fetch `url` without the scheme check; `load` enforces HTTPS first.
  pub(crate) async fn download(&self, url: &Url) -> Result<String> {
    let timeout = Duration::from_secs(self.config.timeout_secs);
    let fetched = get_capped(&self.http, url, self.config.max_bytes, timeout).await?;
    tracing::debug!(%url, bytes = fetched.body.len(), "fetched remote feed");
    String::from_utf8(fetched.body.to_vec())
      .map_err(|e| Error::Feed(cadence_feed::Error::MalformedRecord(format!(
        "feed is not UTF-8: {e}"
      ))))
  }
}

/// Follow at most [`MAX_FEED_REDIRECTS`] hops, each of which must stay on
/// `https`. The scheme check in `load` only sees the first URL.
fn https_only_redirects() -> redirect::Policy {
  redirect::Policy::custom(|attempt| {
    if attempt.previous().len() > MAX_FEED_REDIRECTS {
      attempt.error("too many redirects")
    } else if attempt.url().scheme() != "https" {
      let target = attempt.url().to_string();
      attempt.error(format!("refusing redirect to non-https {target}"))
    } else {
      attempt.follow()
    }
  })
}
