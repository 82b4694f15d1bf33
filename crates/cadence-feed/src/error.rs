//! Error types for the cadence-feed codec.

use cadence_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("feed is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("feed must be a JSON array of post records")]
  NotAnArray,

  #[error("malformed record: {0}")]
  MalformedRecord(String),

  #[error("day {0} is outside the feed range 1..={max}", max = crate::MAX_FEED_DAY)]
  DayOutOfRange(i64),

  #[error("cannot tell the slot from time label {0:?}")]
  UnknownSlot(String),

  #[error("target audience must not be empty")]
  EmptyAudience,

  #[error(transparent)]
  Content(#[from] cadence_core::Error),
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Content(e) => e.kind(),
      _ => ErrorKind::Validation,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
