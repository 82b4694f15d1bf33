//! Slot classification from free-text time labels.
//!
//! Order of precedence:
//!   1. an evening marker (Arabic or Latin) → PM
//!   2. a morning or midday marker → AM
//!   3. a leading 24-hour `H:MM` → PM from 17:00, AM before
//!
//! Anything else cannot be placed and is rejected.

use std::sync::LazyLock;

use cadence_core::post::Slot;
use regex::Regex;

use crate::error::{Error, Result};

const PM_MARKERS: &[&str] = &["مساء", "ليل", "عشاء"];
const AM_MARKERS: &[&str] = &["ظهر", "صباح", "فجر"];

/// Hour at which a bare 24-hour label starts counting as evening.
const PM_FROM_HOUR: u32 = 17;

static LATIN_PM: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)(?:^|[^a-z])p\.?m(?:[^a-z]|$)|\b(?:evening|night)\b")
    .expect("literal regex")
});

static LATIN_AM: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)(?:^|[^a-z])a\.?m(?:[^a-z]|$)|\b(?:morning|noon|afternoon)\b")
    .expect("literal regex")
});

static CLOCK: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\s*(\d{1,2}):([0-5]\d)\b").expect("literal regex"));

/// Decide which daily slot a feed time label belongs to.
pub fn classify_slot(label: &str) -> Result<Slot> {
  if PM_MARKERS.iter().any(|m| label.contains(m)) || LATIN_PM.is_match(label) {
    return Ok(Slot::Pm);
  }
  if AM_MARKERS.iter().any(|m| label.contains(m)) || LATIN_AM.is_match(label) {
    return Ok(Slot::Am);
  }

  let hour = CLOCK
    .captures(label)
    .and_then(|c| c.get(1))
    .and_then(|h| h.as_str().parse::<u32>().ok())
    .filter(|h| *h < 24)
    .ok_or_else(|| Error::UnknownSlot(label.to_owned()))?;

  Ok(if hour >= PM_FROM_HOUR { Slot::Pm } else { Slot::Am })
}
