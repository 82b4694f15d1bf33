//! Runtime configuration, deserialised from `cadence.toml` and `CADENCE__*`
//! environment variables. Every field has a default.

use std::{path::PathBuf, time::Duration};

use cadence_core::{post::CLAIM_LEASE_SECS, schedule::parse_offset};
use chrono::FixedOffset;
use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub store_path: PathBuf,
  pub schedule:   ScheduleConfig,
  pub feed:       FeedConfig,
  pub media:      MediaConfig,
  pub x:          XConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
  /// Fixed reference offset of the operating region, e.g. `+03:00`. No
  /// daylight-saving rules are applied.
  pub utc_offset: String,
}

impl Default for ScheduleConfig {
  fn default() -> Self { Self { utc_offset: "+03:00".into() } }
}

impl ScheduleConfig {
  pub fn offset(&self) -> Result<FixedOffset> { Ok(parse_offset(&self.utc_offset)?) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
  /// Directory holding the bundled feeds.
  pub local_dir:     PathBuf,
  /// File names under `local_dir` that may be imported. Nothing else is
  /// readable.
  pub allowed_files: Vec<String>,
  pub max_bytes:     u64,
  pub timeout_secs:  u64,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      local_dir:     PathBuf::from("feeds"),
      allowed_files: Vec::new(),
      max_bytes:     1024 * 1024,
      timeout_secs:  10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
  /// Used when a campaign has no fallback image of its own.
  pub default_fallback_image: Option<String>,
  /// Site whose `og:image` is the last-resort fallback.
  pub site_url:               Option<String>,
  pub og_timeout_secs:        u64,
  pub download_timeout_secs:  u64,
  pub max_download_bytes:     u64,
}

impl Default for MediaConfig {
  fn default() -> Self {
    Self {
      default_fallback_image: None,
      site_url:               None,
      og_timeout_secs:        5,
      download_timeout_secs:  10,
      max_download_bytes:     5 * 1024 * 1024,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XConfig {
  pub api_base:     String,
  /// OAuth 2.0 user bearer token. Only network operations need it.
  pub access_token: Option<String>,
  /// Bound on each X API request.
  pub timeout_secs: u64,
}

impl Default for XConfig {
  fn default() -> Self {
    Self {
      api_base:     "https://api.x.com".into(),
      access_token: None,
      timeout_secs: 30,
    }
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("cadence.db"),
      schedule:   ScheduleConfig::default(),
      feed:       FeedConfig::default(),
      media:      MediaConfig::default(),
      x:          XConfig::default(),
    }
  }
}

impl EngineConfig {
  /// Worst-case time a publish holds its claim: the `og:image` lookup, the
  /// media downloads, then three X requests in sequence (upload, alt text,
  /// post). Downloads and uploads of several files run concurrently.
  pub fn publish_deadline(&self) -> Duration {
    Duration::from_secs(
      self.media.og_timeout_secs + self.media.download_timeout_secs + 3 * self.x.timeout_secs,
    )
  }

  /// Reject settings under which a publish could outlive its claim lease.
  pub fn validate(&self) -> Result<()> {
    let deadline = self.publish_deadline().as_secs();
    let lease = CLAIM_LEASE_SECS.unsigned_abs();
    if deadline >= lease {
      return Err(Error::Config(format!(
        "publish timeouts add up to {deadline}s, which must stay under the {lease}s claim lease"
      )));
    }
    self.schedule.offset()?;
    Ok(())
  }
}
