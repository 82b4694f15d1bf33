//! Error type for `cadence-engine`.

use cadence_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] cadence_core::Error),

  #[error(transparent)]
  Feed(#[from] cadence_feed::Error),

  /// A store backend error, classified at the point it was raised.
  #[error("{source}")]
  Store {
    kind:   ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// A social-network call failed outside of a publish attempt.
  #[error("network error: {0}")]
  Network(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} answered with status {status}")]
  Status { url: String, status: u16 },

  #[error("response exceeds the {max_bytes}-byte limit")]
  TooLarge { max_bytes: u64 },

  #[error("remote feeds must use https: {0}")]
  InsecureUrl(String),

  #[error("feed file is not on the allow-list: {0:?}")]
  NotAllowed(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("configuration error: {0}")]
  Config(String),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    Self::Store { kind: e.kind(), source: Box::new(e) }
  }

  pub fn network<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Network(Box::new(e))
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Feed(e) => e.kind(),
      Self::Store { kind, .. } => *kind,
      Self::Network(_)
      | Self::Http(_)
      | Self::Status { .. }
      | Self::TooLarge { .. }
      | Self::Io(_) => ErrorKind::Fetch,
      Self::InsecureUrl(_) | Self::NotAllowed(_) | Self::Config(_) => {
        ErrorKind::Validation
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
