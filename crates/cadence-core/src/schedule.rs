//! Time conversion from local wall-clock slots to absolute UTC instants.
//!
//! A campaign runs on a fixed numeric UTC offset for its operating region.
//! There is no timezone-database lookup and no daylight-saving awareness:
//! a schedule committed today must resolve to the same instant tomorrow.

use chrono::{
  DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, Utc,
  format::{self, Parsed, StrftimeItems},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, post::Slot};

/// Longest campaign span accepted, in days.
pub const MAX_TOTAL_DAYS: u32 = 90;
pub const DEFAULT_TOTAL_DAYS: u32 = 45;

/// Human-readable labels for each slot. These are constant regardless of
/// the configured time of day.
pub const AM_LABEL: &str = "1:00 ظهرًا";
pub const PM_LABEL: &str = "8:30 مساءً";

pub fn slot_label(slot: Slot) -> &'static str {
  match slot {
    Slot::Am => AM_LABEL,
    Slot::Pm => PM_LABEL,
  }
}

// ─── Campaign cadence ────────────────────────────────────────────────────────

/// The cadence part of a campaign: a date range and two daily slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSchedule {
  /// Calendar date of day 1; no time component.
  pub start_date: NaiveDate,
  pub total_days: u32,
  #[serde(with = "hh_mm")]
  pub am_time:    NaiveTime,
  #[serde(with = "hh_mm")]
  pub pm_time:    NaiveTime,
}

impl CampaignSchedule {
  /// A schedule starting on `start_date` with the default span and slot
  /// times (13:00 and 20:30).
  pub fn starting(start_date: NaiveDate) -> Self {
    Self {
      start_date,
      total_days: DEFAULT_TOTAL_DAYS,
      am_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or(NaiveTime::MIN),
      pm_time: NaiveTime::from_hms_opt(20, 30, 0).unwrap_or(NaiveTime::MIN),
    }
  }

  pub fn validate(&self) -> Result<()> {
    if !(1..=MAX_TOTAL_DAYS).contains(&self.total_days) {
      return Err(Error::validation(format!(
        "total_days must be between 1 and {MAX_TOTAL_DAYS}, got {}",
        self.total_days
      )));
    }
    Ok(())
  }

  /// Compute the schedule for `day` (1-indexed) and `slot`.
  pub fn compute(
    &self,
    day: u32,
    slot: Slot,
    offset: FixedOffset,
  ) -> Result<ComputedSchedule> {
    compute_schedule(
      self.start_date,
      day,
      slot,
      self.am_time,
      self.pm_time,
      offset,
    )
  }
}

// ─── Conversion ──────────────────────────────────────────────────────────────

/// The result of converting a (day, slot) pair to concrete instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputedSchedule {
  /// Wall-clock time in the reference offset.
  pub local: DateTime<FixedOffset>,
  /// The same instant in UTC.
  pub utc:   DateTime<Utc>,
  pub label: &'static str,
}

/// Convert `day` of a campaign starting on `start_date` to local and UTC
/// instants for `slot`.
///
/// Pure and deterministic. `day` is 1-indexed and is not checked against the
/// campaign's span; that is the caller's job.
pub fn compute_schedule(
  start_date: NaiveDate,
  day: u32,
  slot: Slot,
  am_time: NaiveTime,
  pm_time: NaiveTime,
  offset: FixedOffset,
) -> Result<ComputedSchedule> {
  if day == 0 {
    return Err(Error::validation("day is 1-indexed; got 0"));
  }

  let date = start_date
    .checked_add_days(Days::new(u64::from(day - 1)))
    .ok_or_else(|| Error::validation(format!("day {day} overflows the calendar")))?;

  let time = match slot {
    Slot::Am => am_time,
    Slot::Pm => pm_time,
  };

  // Local wall clock minus the offset is the UTC wall clock.
  let wall = date.and_time(time);
  let utc_wall = wall - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
  let local = DateTime::<FixedOffset>::from_naive_utc_and_offset(utc_wall, offset);

  Ok(ComputedSchedule {
    local,
    utc: local.with_timezone(&Utc),
    label: slot_label(slot),
  })
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parse an `HH:MM` time of day.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s.trim(), "%H:%M")
    .map_err(|_| Error::validation(format!("expected HH:MM time of day, got {s:?}")))
}

/// Parse a fixed UTC offset written as `+HH:MM`, `-HH:MM`, `+HHMM` or `Z`.
/// Trailing text is an error.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
  let s = s.trim();
  if s.eq_ignore_ascii_case("z") {
    return Ok(Utc.fix());
  }
  let mut parsed = Parsed::new();
  format::parse(&mut parsed, s, StrftimeItems::new("%z"))
    .and_then(|()| parsed.to_fixed_offset())
    .map_err(|e| Error::validation(format!("invalid UTC offset {s:?}: {e}")))
}

/// Serde adapter rendering a [`NaiveTime`] as `HH:MM`.
pub mod hh_mm {
  use chrono::NaiveTime;
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.format("%H:%M").to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    super::parse_time_of_day(&raw).map_err(D::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn plus3() -> FixedOffset { parse_offset("+03:00").unwrap() }

  fn q1() -> CampaignSchedule {
    CampaignSchedule {
      start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
      total_days: 45,
      am_time:    parse_time_of_day("13:00").unwrap(),
      pm_time:    parse_time_of_day("20:30").unwrap(),
    }
  }

  #[test]
  fn day_one_am_converts_to_utc() {
    let s = q1().compute(1, Slot::Am, plus3()).unwrap();
    assert_eq!(s.local.to_rfc3339(), "2025-01-01T13:00:00+03:00");
    assert_eq!(s.utc.to_rfc3339(), "2025-01-01T10:00:00+00:00");
    assert_eq!(s.label, AM_LABEL);
  }

  #[test]
  fn later_day_pm_advances_calendar() {
    let s = q1().compute(3, Slot::Pm, plus3()).unwrap();
    assert_eq!(s.local.to_rfc3339(), "2025-01-03T20:30:00+03:00");
    assert_eq!(s.utc.to_rfc3339(), "2025-01-03T17:30:00+00:00");
    assert_eq!(s.label, PM_LABEL);
  }

  #[test]
  fn early_local_time_lands_on_previous_utc_day() {
    let mut sched = q1();
    sched.am_time = parse_time_of_day("01:15").unwrap();
    let s = sched.compute(1, Slot::Am, plus3()).unwrap();
    assert_eq!(s.utc.to_rfc3339(), "2024-12-31T22:15:00+00:00");
  }

  #[test]
  fn repeated_calls_are_identical() {
    let a = q1().compute(17, Slot::Pm, plus3()).unwrap();
    let b = q1().compute(17, Slot::Pm, plus3()).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn label_ignores_configured_minute() {
    let mut sched = q1();
    sched.pm_time = parse_time_of_day("21:45").unwrap();
    let s = sched.compute(1, Slot::Pm, plus3()).unwrap();
    assert_eq!(s.label, PM_LABEL);
  }

  #[test]
  fn day_zero_is_rejected() {
    assert!(matches!(
      q1().compute(0, Slot::Am, plus3()),
      Err(Error::Validation(_))
    ));
  }

  #[test]
  fn total_days_bounds() {
    let mut s = q1();
    s.total_days = 0;
    assert!(s.validate().is_err());
    s.total_days = 91;
    assert!(s.validate().is_err());
    s.total_days = 90;
    assert!(s.validate().is_ok());
  }

  #[test]
  fn offsets_parse() {
    assert_eq!(parse_offset("+03:00").unwrap().local_minus_utc(), 10_800);
    assert_eq!(parse_offset("-0530").unwrap().local_minus_utc(), -19_800);
    assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
    assert!(parse_offset("03:00").is_err());
    assert!(parse_offset("+3").is_err());
    assert!(parse_offset("+03:75").is_err());
    assert!(parse_offset("+03:00 Riyadh").is_err());
    assert!(parse_offset("+25:00").is_err());
    assert_eq!(parse_offset(" z ").unwrap().local_minus_utc(), 0);
  }

  #[test]
  fn time_of_day_parses_hh_mm_only() {
    assert!(parse_time_of_day("20:30").is_ok());
    assert!(parse_time_of_day("8:30 pm").is_err());
    assert!(parse_time_of_day("25:00").is_err());
  }

  #[test]
  fn schedule_serialises_times_as_hh_mm() {
    let json = serde_json::to_value(q1()).unwrap();
    assert_eq!(json["am_time"], "13:00");
    assert_eq!(json["pm_time"], "20:30");
    let back: CampaignSchedule = serde_json::from_value(json).unwrap();
    assert_eq!(back, q1());
  }
}
