//! [`SqliteStore`], the SQLite implementation of the Cadence store traits.

use std::path::Path;

use cadence_core::{campaign::Campaign, post::Post, store::StoreBackend};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{CAMPAIGN_COLUMNS, POST_COLUMNS, RawCampaign, RawPost, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Cadence store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// are serialised on the connection's thread.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl StoreBackend for SqliteStore {
  type Error = Error;
}

// ─── Shared row helpers ──────────────────────────────────────────────────────

/// Whether `e` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

pub(crate) fn load_campaign(
  conn: &rusqlite::Connection,
  id: Uuid,
) -> Result<Option<Campaign>> {
  let raw = conn
    .query_row(
      &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE campaign_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawCampaign::from_row,
    )
    .optional()?;
  raw.map(RawCampaign::into_campaign).transpose()
}

pub(crate) fn require_campaign(conn: &rusqlite::Connection, id: Uuid) -> Result<Campaign> {
  load_campaign(conn, id)?.ok_or(Error::Core(cadence_core::Error::CampaignNotFound(id)))
}

pub(crate) fn load_post(conn: &rusqlite::Connection, id: Uuid) -> Result<Option<Post>> {
  let raw = conn
    .query_row(
      &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.post_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawPost::from_row,
    )
    .optional()?;
  raw.map(RawPost::into_post).transpose()
}

pub(crate) fn require_post(conn: &rusqlite::Connection, id: Uuid) -> Result<Post> {
  load_post(conn, id)?.ok_or(Error::Core(cadence_core::Error::PostNotFound(id)))
}
