//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! UTC timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that text comparison orders them correctly.
//! Enumerations use their lowercase names. Media URL lists are compact JSON.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, Utc};
use cadence_core::{
  campaign::{Campaign, CampaignStatus},
  post::{Post, PostContent, PostStatus, Slot},
  schedule::CampaignSchedule,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_local_dt(dt: DateTime<FixedOffset>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub fn decode_local_dt(s: &str) -> Result<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(s).map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Calendar dates & times of day ───────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enumerations ────────────────────────────────────────────────────────────

fn decode_enum<T: FromStr>(what: &str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

pub fn decode_slot(s: &str) -> Result<Slot> { decode_enum("slot", s) }

pub fn decode_post_status(s: &str) -> Result<PostStatus> { decode_enum("post status", s) }

pub fn decode_campaign_status(s: &str) -> Result<CampaignStatus> {
  decode_enum("campaign status", s)
}

// ─── Media URLs ──────────────────────────────────────────────────────────────

pub fn encode_media_urls(urls: &[String]) -> Result<String> {
  Ok(serde_json::to_string(urls)?)
}

pub fn decode_media_urls(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

fn to_u32(what: &str, v: i64) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::Decode(format!("{what} out of range: {v}")))
}

// ─── Text search ─────────────────────────────────────────────────────────────

/// A `LIKE ... ESCAPE '\'` pattern matching `text` literally anywhere.
pub fn contains_pattern(text: &str) -> String {
  let mut pattern = String::with_capacity(text.len() + 2);
  pattern.push('%');
  for c in text.chars() {
    if matches!(c, '\\' | '%' | '_') {
      pattern.push('\\');
    }
    pattern.push(c);
  }
  pattern.push('%');
  pattern
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const CAMPAIGN_COLUMNS: &str = "campaign_id, name, description, start_date, total_days, \
   am_time, pm_time, fallback_image_url, status, is_active, created_at, updated_at";

/// Raw values read directly from a `campaigns` row.
pub struct RawCampaign {
  pub campaign_id:        String,
  pub name:               String,
  pub description:        Option<String>,
  pub start_date:         String,
  pub total_days:         i64,
  pub am_time:            String,
  pub pm_time:            String,
  pub fallback_image_url: Option<String>,
  pub status:             String,
  pub is_active:          bool,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawCampaign {
  /// Map a row selected with [`CAMPAIGN_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      campaign_id:        row.get(0)?,
      name:               row.get(1)?,
      description:        row.get(2)?,
      start_date:         row.get(3)?,
      total_days:         row.get(4)?,
      am_time:            row.get(5)?,
      pm_time:            row.get(6)?,
      fallback_image_url: row.get(7)?,
      status:             row.get(8)?,
      is_active:          row.get(9)?,
      created_at:         row.get(10)?,
      updated_at:         row.get(11)?,
    })
  }

  pub fn into_campaign(self) -> Result<Campaign> {
    Ok(Campaign {
      campaign_id:        decode_uuid(&self.campaign_id)?,
      name:               self.name,
      description:        self.description,
      schedule:           CampaignSchedule {
        start_date: decode_date(&self.start_date)?,
        total_days: to_u32("total_days", self.total_days)?,
        am_time:    decode_time(&self.am_time)?,
        pm_time:    decode_time(&self.pm_time)?,
      },
      fallback_image_url: self.fallback_image_url,
      status:             decode_campaign_status(&self.status)?,
      is_active:          self.is_active,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

/// Post columns, qualified with the `p` alias every post query uses.
pub const POST_COLUMNS: &str = "p.post_id, p.campaign_id, p.day, p.slot, p.cycle, \
   p.target_audience, p.body, p.media_urls, p.media_alt, p.use_og_fallback, p.time_label, \
   p.scheduled_local, p.scheduled_utc, p.source, p.status, p.external_id, p.error, \
   p.posted_at, p.created_at, p.updated_at";

/// Raw values read directly from a `posts` row.
pub struct RawPost {
  pub post_id:         String,
  pub campaign_id:     String,
  pub day:             i64,
  pub slot:            String,
  pub cycle:           i64,
  pub target_audience: String,
  pub body:            String,
  pub media_urls:      String,
  pub media_alt:       Option<String>,
  pub use_og_fallback: bool,
  pub time_label:      String,
  pub scheduled_local: String,
  pub scheduled_utc:   String,
  pub source:          Option<String>,
  pub status:          String,
  pub external_id:     Option<String>,
  pub error:           Option<String>,
  pub posted_at:       Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawPost {
  /// Map a row selected with [`POST_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      post_id:         row.get(0)?,
      campaign_id:     row.get(1)?,
      day:             row.get(2)?,
      slot:            row.get(3)?,
      cycle:           row.get(4)?,
      target_audience: row.get(5)?,
      body:            row.get(6)?,
      media_urls:      row.get(7)?,
      media_alt:       row.get(8)?,
      use_og_fallback: row.get(9)?,
      time_label:      row.get(10)?,
      scheduled_local: row.get(11)?,
      scheduled_utc:   row.get(12)?,
      source:          row.get(13)?,
      status:          row.get(14)?,
      external_id:     row.get(15)?,
      error:           row.get(16)?,
      posted_at:       row.get(17)?,
      created_at:      row.get(18)?,
      updated_at:      row.get(19)?,
    })
  }

  pub fn into_post(self) -> Result<Post> {
    Ok(Post {
      post_id:         decode_uuid(&self.post_id)?,
      campaign_id:     decode_uuid(&self.campaign_id)?,
      day:             to_u32("day", self.day)?,
      slot:            decode_slot(&self.slot)?,
      cycle:           to_u32("cycle", self.cycle)?,
      content:         PostContent {
        target_audience: self.target_audience,
        body:            self.body,
        media_urls:      decode_media_urls(&self.media_urls)?,
        media_alt:       self.media_alt,
        use_og_fallback: self.use_og_fallback,
        source:          self.source,
      },
      time_label:      self.time_label,
      scheduled_local: decode_local_dt(&self.scheduled_local)?,
      scheduled_utc:   decode_dt(&self.scheduled_utc)?,
      status:          decode_post_status(&self.status)?,
      external_id:     self.external_id,
      error:           self.error,
      posted_at:       self.posted_at.as_deref().map(decode_dt).transpose()?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn utc_encoding_is_fixed_width_and_sortable() {
    let a = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
    let b = a + chrono::TimeDelta::milliseconds(1);
    let c = Utc.with_ymd_and_hms(2025, 1, 1, 9, 59, 59).unwrap();
    assert_eq!(encode_dt(a), "2025-01-01T10:00:00.000000Z");
    assert_eq!(encode_dt(a).len(), encode_dt(b).len());
    assert!(encode_dt(c) < encode_dt(a));
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn unknown_enum_values_are_decode_errors() {
    assert!(matches!(decode_slot("noon"), Err(Error::Decode(_))));
    assert_eq!(decode_post_status("posted").unwrap(), PostStatus::Posted);
  }
}
