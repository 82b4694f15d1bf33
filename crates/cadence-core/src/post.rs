//! Posts: one scheduled item of a campaign's cadence.
//!
//! A post is identified naturally by `(campaign_id, day, slot, cycle)`. Once
//! published (`Posted`) it is frozen; the only permitted change is a
//! correction to `Failed`.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{Error, Result, schedule::ComputedSchedule};

/// Network length limit, counted in Unicode scalar values.
pub const MAX_BODY_CHARS: usize = 280;
/// Attachments accepted per post by the network.
pub const MAX_MEDIA: usize = 4;
pub const MAX_ALT_CHARS: usize = 1000;
pub const DEFAULT_CYCLE: u32 = 1;

/// How long a publish claim stays valid before another invocation may take
/// the post over.
pub const CLAIM_LEASE_SECS: i64 = 300;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// One of the two daily time slots.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Slot {
  Am,
  Pm,
}

/// Lifecycle status of a post.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PostStatus {
  #[default]
  Draft,
  Approved,
  Posted,
  Failed,
}

// ─── Keys & content ──────────────────────────────────────────────────────────

/// The natural key of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostKey {
  pub campaign_id: Uuid,
  pub day:         u32,
  pub slot:        Slot,
  pub cycle:       u32,
}

/// The mutable content of a post. Upserts overwrite all of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
  pub target_audience: String,
  pub body:            String,
  #[serde(default)]
  pub media_urls:      Vec<String>,
  pub media_alt:       Option<String>,
  /// Attach the campaign's fallback image when `media_urls` is empty.
  #[serde(default = "default_true")]
  pub use_og_fallback: bool,
  /// Provenance, e.g. which import produced the post.
  pub source:          Option<String>,
}

fn default_true() -> bool { true }

impl PostContent {
  pub fn validate(&self) -> Result<()> {
    validate_body(&self.body)?;
    if self.media_urls.len() > MAX_MEDIA {
      return Err(Error::validation(format!(
        "at most {MAX_MEDIA} media URLs per post, got {}",
        self.media_urls.len()
      )));
    }
    for url in &self.media_urls {
      validate_media_url(url)?;
    }
    if let Some(alt) = &self.media_alt
      && alt.chars().count() > MAX_ALT_CHARS
    {
      return Err(Error::validation(format!(
        "media alt text exceeds {MAX_ALT_CHARS} characters"
      )));
    }
    Ok(())
  }
}

/// Check a post body against the network's limits.
pub fn validate_body(body: &str) -> Result<()> {
  if body.trim().is_empty() {
    return Err(Error::validation("post body must not be empty"));
  }
  let len = body.chars().count();
  if len > MAX_BODY_CHARS {
    return Err(Error::validation(format!(
      "post body is {len} characters; the limit is {MAX_BODY_CHARS}"
    )));
  }
  Ok(())
}

/// Parse `raw` as an absolute `http`/`https` URL.
pub fn validate_media_url(raw: &str) -> Result<Url> {
  let url = Url::parse(raw)
    .map_err(|e| Error::validation(format!("malformed media URL {raw:?}: {e}")))?;
  match url.scheme() {
    "http" | "https" if url.has_host() => Ok(url),
    _ => Err(Error::validation(format!(
      "media URL must be http(s) with a host: {raw:?}"
    ))),
  }
}

// ─── Post ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
  pub post_id:         Uuid,
  pub campaign_id:     Uuid,
  pub day:             u32,
  pub slot:            Slot,
  pub cycle:           u32,
  #[serde(flatten)]
  pub content:         PostContent,
  pub time_label:      String,
  pub scheduled_local: DateTime<FixedOffset>,
  pub scheduled_utc:   DateTime<Utc>,
  pub status:          PostStatus,
  /// Id assigned by the network; set only on a successful publish.
  pub external_id:     Option<String>,
  /// Detail of the last failed publish.
  pub error:           Option<String>,
  /// Non-null if and only if `status == Posted`.
  pub posted_at:       Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

impl Post {
  pub fn key(&self) -> PostKey {
    PostKey {
      campaign_id: self.campaign_id,
      day:         self.day,
      slot:        self.slot,
      cycle:       self.cycle,
    }
  }
}

// ─── Upsert input ────────────────────────────────────────────────────────────

/// Input to [`crate::store::PostStore::upsert_post`].
#[derive(Debug, Clone)]
pub struct PostDraft {
  pub key:      PostKey,
  pub content:  PostContent,
  pub schedule: ComputedSchedule,
}

/// Returned by an upsert: the stored row and whether it was newly created.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
  pub post:    Post,
  pub created: bool,
}

// ─── PostPatch ───────────────────────────────────────────────────────────────

/// A partial update of a post. The natural key is never patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostPatch {
  pub target_audience: Option<String>,
  pub body:            Option<String>,
  pub media_urls:      Option<Vec<String>>,
  pub media_alt:       Option<Option<String>>,
  pub use_og_fallback: Option<bool>,
  pub status:          Option<PostStatus>,
  pub error:           Option<Option<String>>,
}

impl PostPatch {
  pub fn status(status: PostStatus) -> Self {
    Self { status: Some(status), ..Default::default() }
  }

  fn touches_content(&self) -> bool {
    self.target_audience.is_some()
      || self.body.is_some()
      || self.media_urls.is_some()
      || self.media_alt.is_some()
      || self.use_og_fallback.is_some()
  }

  /// Apply the patch to `current`. Returns the would-be post; `updated_at`
  /// is left for the store to set.
  ///
  /// - A `Posted` post only accepts a correction to `Failed` (optionally with
  ///   an error message). The correction clears `posted_at` and keeps
  ///   `external_id`.
  /// - Nothing but the publisher may set `Posted`.
  /// - A corrected post (failed, with an `external_id`) cannot be
  ///   re-approved.
  pub fn apply_to(&self, current: &Post) -> Result<Post> {
    if self.status == Some(PostStatus::Posted) {
      return Err(Error::invalid_state(
        "only the publisher can mark a post as posted",
      ));
    }

    if current.status == PostStatus::Posted {
      if self.touches_content() || self.status != Some(PostStatus::Failed) {
        return Err(Error::invalid_state("cannot modify a posted item"));
      }
      let mut next = current.clone();
      next.status = PostStatus::Failed;
      next.posted_at = None;
      if let Some(error) = &self.error {
        next.error = error.clone();
      }
      return Ok(next);
    }

    if self.status == Some(PostStatus::Approved)
      && current.status == PostStatus::Failed
      && current.external_id.is_some()
    {
      return Err(Error::invalid_state(
        "post was already published and cannot be re-approved",
      ));
    }

    let mut next = current.clone();
    if let Some(v) = &self.target_audience {
      next.content.target_audience = v.clone();
    }
    if let Some(v) = &self.body {
      next.content.body = v.clone();
    }
    if let Some(v) = &self.media_urls {
      next.content.media_urls = v.clone();
    }
    if let Some(v) = &self.media_alt {
      next.content.media_alt = v.clone();
    }
    if let Some(v) = self.use_og_fallback {
      next.content.use_og_fallback = v;
    }
    if let Some(status) = self.status {
      next.status = status;
    }
    if let Some(error) = &self.error {
      next.error = error.clone();
    }
    next.content.validate()?;
    Ok(next)
  }
}

// ─── Publish outcome ─────────────────────────────────────────────────────────

/// Final state written by the publisher once the network call resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
  Posted { external_id: String },
  Failed { error: String },
}

// ─── Queries ─────────────────────────────────────────────────────────────────

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Parameters for [`crate::store::PostStore::list_posts`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostQuery {
  pub campaign_id:   Option<Uuid>,
  pub campaign_name: Option<String>,
  pub status:        Option<PostStatus>,
  pub day:           Option<u32>,
  pub slot:          Option<Slot>,
  pub cycle:         Option<u32>,
  /// Free-text filter over body and target audience.
  pub search:        Option<String>,
  /// 1-indexed page number.
  pub page:          Option<u32>,
  pub limit:         Option<u32>,
}

impl PostQuery {
  /// Effective `(page, limit, offset)` after defaults and clamping.
  pub fn page_bounds(&self) -> (u32, u32, u64) {
    let page = self.page.unwrap_or(1).max(1);
    let limit = self
      .limit
      .unwrap_or(DEFAULT_PAGE_LIMIT)
      .clamp(1, MAX_PAGE_LIMIT);
    (page, limit, u64::from(page - 1) * u64::from(limit))
  }
}

/// One page of a post listing.
#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
  pub items: Vec<Post>,
  pub total: u64,
  pub page:  u32,
  pub limit: u32,
}

/// Number of posts of a campaign in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
  pub draft:    u64,
  pub approved: u64,
  pub posted:   u64,
  pub failed:   u64,
}

impl StatusCounts {
  pub fn add(&mut self, status: PostStatus, n: u64) {
    match status {
      PostStatus::Draft => self.draft += n,
      PostStatus::Approved => self.approved += n,
      PostStatus::Posted => self.posted += n,
      PostStatus::Failed => self.failed += n,
    }
  }

  pub fn total(&self) -> u64 { self.draft + self.approved + self.posted + self.failed }
}
