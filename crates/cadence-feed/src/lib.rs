//! Content-feed codec for Cadence.
//!
//! Parses the external JSON feed (an array of post records) into validated
//! [`FeedItem`]s ready to be scheduled. Pure synchronous; no HTTP or database
//! dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use cadence_feed::parse_feed;
//!
//! let feed = r#"[{"day":1,"time":"1:00 ظهرًا","target_audience":"general","content":"Hello"}]"#;
//! for (index, item) in parse_feed(feed).unwrap().into_iter().enumerate() {
//!   println!("record {index}: {:?}", item.map(|i| i.slot));
//! }
//! ```

pub mod error;
mod slot;

use cadence_core::post::{Slot, validate_body, validate_media_url, MAX_ALT_CHARS, MAX_MEDIA};
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};
pub use slot::classify_slot;

/// Days in the feed format are bounded independently of any campaign.
pub const MAX_FEED_DAY: i64 = 45;

// ─── Public types ────────────────────────────────────────────────────────────

/// One record of the feed, as written by the content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
  pub day:             i64,
  /// Free-text local time label, e.g. `"1:00 ظهرًا"` or `"20:30"`.
  pub time:            String,
  pub target_audience: String,
  pub content:         String,
  #[serde(rename = "mediaUrls", default)]
  pub media_urls:      Vec<String>,
  #[serde(rename = "mediaAlt", default)]
  pub media_alt:       Option<String>,
}

/// A record that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
  pub day:             u32,
  pub slot:            Slot,
  /// The label as written in the feed.
  pub time:            String,
  pub target_audience: String,
  pub body:            String,
  pub media_urls:      Vec<String>,
  pub media_alt:       Option<String>,
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse a feed document.
///
/// Fails only if `input` is not a JSON array. Each element is decoded and
/// validated independently; a bad element yields `Err(..)` in its position
/// without aborting the rest.
pub fn parse_feed(input: &str) -> Result<Vec<Result<FeedItem>>> {
  let value: serde_json::Value = serde_json::from_str(input)?;
  let serde_json::Value::Array(elements) = value else {
    return Err(Error::NotAnArray);
  };

  Ok(
    elements
      .into_iter()
      .map(|element| {
        serde_json::from_value::<FeedRecord>(element)
          .map_err(|e| Error::MalformedRecord(e.to_string()))
          .and_then(validate)
      })
      .collect(),
  )
}

/// Validate a decoded record and classify its slot.
pub fn validate(record: FeedRecord) -> Result<FeedItem> {
  if !(1..=MAX_FEED_DAY).contains(&record.day) {
    return Err(Error::DayOutOfRange(record.day));
  }
  let day = u32::try_from(record.day).map_err(|_| Error::DayOutOfRange(record.day))?;

  if record.target_audience.trim().is_empty() {
    return Err(Error::EmptyAudience);
  }
  validate_body(&record.content)?;

  if record.media_urls.len() > MAX_MEDIA {
    return Err(Error::MalformedRecord(format!(
      "at most {MAX_MEDIA} media URLs per record, got {}",
      record.media_urls.len()
    )));
  }
  for url in &record.media_urls {
    validate_media_url(url)?;
  }

  let media_alt = record.media_alt.filter(|alt| !alt.trim().is_empty());
  if let Some(alt) = &media_alt
    && alt.chars().count() > MAX_ALT_CHARS
  {
    return Err(Error::MalformedRecord(format!(
      "mediaAlt exceeds {MAX_ALT_CHARS} characters"
    )));
  }

  Ok(FeedItem {
    day,
    slot: classify_slot(&record.time)?,
    time: record.time,
    target_audience: record.target_audience.trim().to_owned(),
    body: record.content,
    media_urls: record.media_urls,
    media_alt,
  })
}

#[cfg(test)]
mod tests {
  use cadence_core::{Classify, ErrorKind};

  use super::*;

  #[test]
  fn scenario_b_record_is_morning() {
    let feed = r#"[{"day":1,"time":"1:00 ظهرًا","target_audience":"general","content":"Hello"}]"#;
    let items = parse_feed(feed).unwrap();
    assert_eq!(items.len(), 1);
    let item = items.into_iter().next().unwrap().unwrap();
    assert_eq!(item.day, 1);
    assert_eq!(item.slot, Slot::Am);
    assert_eq!(item.body, "Hello");
    assert!(item.media_urls.is_empty());
  }

  #[test]
  fn bad_records_do_not_abort_siblings() {
    let feed = r#"[
      {"day":0,"time":"20:30","target_audience":"a","content":"too early"},
      {"day":2,"time":"8:30 مساءً","target_audience":"a","content":"ok",
       "mediaUrls":["https://cdn.example.com/a.png"],"mediaAlt":"a cat"},
      {"day":3,"time":"whenever","target_audience":"a","content":"no slot"},
      {"day":"4","time":"20:30","target_audience":"a","content":"string day"},
      {"day":5,"time":"20:30","target_audience":"a","content":"x",
       "mediaUrls":["ftp://example.com/a.png"]}
    ]"#;
    let items = parse_feed(feed).unwrap();
    assert_eq!(items.len(), 5);
    assert!(matches!(items[0], Err(Error::DayOutOfRange(0))));
    let ok = items[1].as_ref().unwrap();
    assert_eq!(ok.slot, Slot::Pm);
    assert_eq!(ok.media_alt.as_deref(), Some("a cat"));
    assert!(matches!(items[2], Err(Error::UnknownSlot(_))));
    assert!(matches!(items[3], Err(Error::MalformedRecord(_))));
    let Err(url_err) = &items[4] else { panic!("ftp URL accepted") };
    assert_eq!(url_err.kind(), ErrorKind::Validation);
  }

  #[test]
  fn day_above_feed_ceiling_is_rejected() {
    let feed = r#"[{"day":46,"time":"13:00","target_audience":"a","content":"x"}]"#;
    assert!(matches!(parse_feed(feed).unwrap()[0], Err(Error::DayOutOfRange(46))));
  }

  #[test]
  fn overlong_body_is_rejected() {
    let body = "ب".repeat(281);
    let feed = serde_json::json!([
      {"day": 1, "time": "13:00", "target_audience": "a", "content": body}
    ])
    .to_string();
    let items = parse_feed(&feed).unwrap();
    assert!(matches!(items[0], Err(Error::Content(_))));

    let exact = serde_json::json!([
      {"day": 1, "time": "13:00", "target_audience": "a", "content": "ب".repeat(280)}
    ])
    .to_string();
    assert!(parse_feed(&exact).unwrap()[0].is_ok());
  }

  #[test]
  fn top_level_must_be_an_array() {
    assert!(matches!(parse_feed(r#"{"day":1}"#), Err(Error::NotAnArray)));
    assert!(matches!(parse_feed("not json"), Err(Error::Json(_))));
    assert!(parse_feed("[]").unwrap().is_empty());
  }
}
