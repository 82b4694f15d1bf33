//! [`PostStore`] implementation, including the claim/complete publish
//! protocol.

use cadence_core::{
  post::{
    CLAIM_LEASE_SECS, Post, PostDraft, PostPage, PostPatch, PostQuery, PostStatus,
    PublishOutcome, Slot, StatusCounts, UpsertOutcome,
  },
  store::PostStore,
};
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result, SqliteStore,
  encode::{
    POST_COLUMNS, RawPost, contains_pattern, decode_post_status, decode_slot, decode_uuid,
    encode_dt, encode_local_dt, encode_media_urls, encode_uuid,
  },
  store::{load_post, require_campaign, require_post},
};

/// Claims taken at or before this instant have lapsed.
fn lease_cutoff(now: DateTime<Utc>) -> String {
  encode_dt(now - TimeDelta::seconds(CLAIM_LEASE_SECS))
}

impl PostStore for SqliteStore {
  async fn upsert_post(&self, draft: PostDraft) -> Result<UpsertOutcome> {
    draft.content.validate()?;
    if draft.key.cycle == 0 {
      return Err(cadence_core::Error::validation("cycle is 1-indexed; got 0").into());
    }

    let outcome = self
      .conn
      .call(move |conn| Ok(upsert_post_tx(conn, &draft)))
      .await??;

    tracing::debug!(
      post_id = %outcome.post.post_id,
      day = outcome.post.day,
      slot = %outcome.post.slot,
      created = outcome.created,
      "post upserted"
    );
    Ok(outcome)
  }

  async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
    self.conn.call(move |conn| Ok(load_post(conn, id))).await?
  }

  async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Post> {
    self
      .conn
      .call(move |conn| Ok(update_post_tx(conn, id, &patch)))
      .await?
  }

  async fn delete_post(&self, id: Uuid) -> Result<()> {
    self
      .conn
      .call(move |conn| Ok(delete_post_tx(conn, id)))
      .await?
  }

  async fn find_due(
    &self,
    campaign_id: Uuid,
    slot: Slot,
    now: DateTime<Utc>,
  ) -> Result<Option<Post>> {
    let campaign_str = encode_uuid(campaign_id);
    let slot_str     = slot.as_ref().to_owned();
    let now_str      = encode_dt(now);
    let cutoff_str   = lease_cutoff(now);

    let raw: Option<RawPost> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {POST_COLUMNS} FROM posts p
                 WHERE p.campaign_id = ?1
                   AND p.slot = ?2
                   AND p.status = 'approved'
                   AND p.scheduled_utc <= ?3
                   AND p.posted_at IS NULL
                   AND (p.claimed_at IS NULL OR p.claimed_at <= ?4)
                 ORDER BY p.scheduled_utc ASC, p.post_id ASC
                 LIMIT 1"
              ),
              rusqlite::params![campaign_str, slot_str, now_str, cutoff_str],
              RawPost::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPost::into_post).transpose()
  }

  async fn list_posts(&self, query: &PostQuery) -> Result<PostPage> {
    let (page, limit, offset) = query.page_bounds();
    let mut conds: Vec<String> = vec![];
    let mut args: Vec<Value> = vec![];

    if let Some(id) = query.campaign_id {
      args.push(Value::Text(encode_uuid(id)));
      conds.push(format!("p.campaign_id = ?{}", args.len()));
    }
    if let Some(name) = &query.campaign_name {
      args.push(Value::Text(name.clone()));
      conds.push(format!("c.name = ?{}", args.len()));
    }
    if let Some(status) = query.status {
      args.push(Value::Text(status.as_ref().to_owned()));
      conds.push(format!("p.status = ?{}", args.len()));
    }
    if let Some(day) = query.day {
      args.push(Value::Integer(i64::from(day)));
      conds.push(format!("p.day = ?{}", args.len()));
    }
    if let Some(slot) = query.slot {
      args.push(Value::Text(slot.as_ref().to_owned()));
      conds.push(format!("p.slot = ?{}", args.len()));
    }
    if let Some(cycle) = query.cycle {
      args.push(Value::Integer(i64::from(cycle)));
      conds.push(format!("p.cycle = ?{}", args.len()));
    }
    if let Some(text) = &query.search {
      args.push(Value::Text(contains_pattern(text)));
      let n = args.len();
      conds.push(format!(
        "(p.body LIKE ?{n} ESCAPE '\\' OR p.target_audience LIKE ?{n} ESCAPE '\\')"
      ));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let from = format!(
      "FROM posts p JOIN campaigns c ON c.campaign_id = p.campaign_id {where_clause}"
    );
    let count_sql = format!("SELECT COUNT(*) {from}");
    let page_sql = format!(
      "SELECT {POST_COLUMNS} {from}
       ORDER BY p.scheduled_utc ASC, p.post_id ASC
       LIMIT {limit} OFFSET {offset}"
    );

    let (total, raws): (i64, Vec<RawPost>) = self
      .conn
      .call(move |conn| {
        let total = conn.query_row(
          &count_sql,
          rusqlite::params_from_iter(args.iter()),
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&page_sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args.iter()), RawPost::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawPost::into_post)
      .collect::<Result<Vec<_>>>()?;

    Ok(PostPage { items, total: u64::try_from(total).unwrap_or(0), page, limit })
  }

  async fn status_counts(&self, campaign_id: Uuid) -> Result<StatusCounts> {
    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        Ok((|| -> Result<Vec<(String, i64)>> {
          require_campaign(conn, campaign_id)?;
          let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM posts WHERE campaign_id = ?1 GROUP BY status",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![encode_uuid(campaign_id)], |r| {
              Ok((r.get(0)?, r.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })())
      })
      .await??;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
      counts.add(decode_post_status(&status)?, u64::try_from(n).unwrap_or(0));
    }
    Ok(counts)
  }

  async fn approve_posts(
    &self,
    campaign_id: Uuid,
    days: Option<(u32, u32)>,
    include_failed: bool,
  ) -> Result<u64> {
    let (from_day, to_day) = days.map_or((None, None), |(a, b)| (Some(a), Some(b)));
    let now_str = encode_dt(Utc::now());

    let approved = self
      .conn
      .call(move |conn| {
        Ok((|| -> Result<usize> {
          require_campaign(conn, campaign_id)?;
          Ok(conn.execute(
            "UPDATE posts SET status = 'approved', updated_at = ?2
             WHERE campaign_id = ?1
               AND (status = 'draft'
                    OR (?3 AND status = 'failed' AND external_id IS NULL))
               AND (?4 IS NULL OR day >= ?4)
               AND (?5 IS NULL OR day <= ?5)",
            rusqlite::params![
              encode_uuid(campaign_id),
              now_str,
              include_failed,
              from_day,
              to_day,
            ],
          )?)
        })())
      })
      .await??;

    tracing::info!(%campaign_id, approved, "posts approved");
    Ok(approved as u64)
  }

  async fn reschedule_posts(&self, campaign_id: Uuid, offset: FixedOffset) -> Result<u64> {
    let touched = self
      .conn
      .call(move |conn| Ok(reschedule_posts_tx(conn, campaign_id, offset)))
      .await??;

    tracing::info!(%campaign_id, touched, "posts rescheduled");
    Ok(touched)
  }

  // ── Publish protocol ──────────────────────────────────────────────────────

  async fn claim_post(&self, id: Uuid, token: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let id_str     = encode_uuid(id);
    let token_str  = encode_uuid(token);
    let now_str    = encode_dt(now);
    let cutoff_str = lease_cutoff(now);

    let claimed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE posts SET claim_token = ?2, claimed_at = ?3
           WHERE post_id = ?1
             AND status = 'approved'
             AND posted_at IS NULL
             AND (claimed_at IS NULL OR claimed_at <= ?4)",
          rusqlite::params![id_str, token_str, now_str, cutoff_str],
        )?)
      })
      .await?;

    Ok(claimed == 1)
  }

  async fn complete_publish(
    &self,
    id: Uuid,
    token: Uuid,
    outcome: PublishOutcome,
    at: DateTime<Utc>,
  ) -> Result<Option<Post>> {
    self
      .conn
      .call(move |conn| Ok(complete_publish_tx(conn, id, token, &outcome, at)))
      .await?
  }
}

// ─── Transaction bodies ──────────────────────────────────────────────────────

fn upsert_post_tx(conn: &mut rusqlite::Connection, draft: &PostDraft) -> Result<UpsertOutcome> {
  let tx = conn.transaction()?;
  let key = draft.key;
  let campaign = require_campaign(&tx, key.campaign_id)?;

  if key.day == 0 || key.day > campaign.schedule.total_days {
    return Err(Error::Core(cadence_core::Error::validation(format!(
      "day {} is outside campaign {:?} span of {} days",
      key.day, campaign.name, campaign.schedule.total_days
    ))));
  }

  let campaign_str = encode_uuid(key.campaign_id);
  let existing: Option<(String, String)> = tx
    .query_row(
      "SELECT post_id, status FROM posts
       WHERE campaign_id = ?1 AND day = ?2 AND slot = ?3 AND cycle = ?4",
      rusqlite::params![campaign_str, key.day, key.slot.as_ref(), key.cycle],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  let now_str = encode_dt(Utc::now());
  let c = &draft.content;
  let media_urls = encode_media_urls(&c.media_urls)?;
  let local_str = encode_local_dt(draft.schedule.local);
  let utc_str = encode_dt(draft.schedule.utc);

  let (post_id, created) = match existing {
    Some((id_str, status)) => {
      if decode_post_status(&status)? == PostStatus::Posted {
        return Err(Error::Core(cadence_core::Error::invalid_state(
          "cannot modify a posted item",
        )));
      }
      tx.execute(
        "UPDATE posts SET
           target_audience = ?2, body = ?3, media_urls = ?4, media_alt = ?5,
           use_og_fallback = ?6, time_label = ?7, scheduled_local = ?8,
           scheduled_utc = ?9, source = ?10, updated_at = ?11
         WHERE post_id = ?1",
        rusqlite::params![
          id_str,
          c.target_audience,
          c.body,
          media_urls,
          c.media_alt,
          c.use_og_fallback,
          draft.schedule.label,
          local_str,
          utc_str,
          c.source,
          now_str,
        ],
      )?;
      (decode_uuid(&id_str)?, false)
    }
    None => {
      let id = Uuid::new_v4();
      tx.execute(
        "INSERT INTO posts (
           post_id, campaign_id, day, slot, cycle, target_audience, body,
           media_urls, media_alt, use_og_fallback, time_label, scheduled_local,
           scheduled_utc, source, status, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                   'draft', ?15, ?15)",
        rusqlite::params![
          encode_uuid(id),
          campaign_str,
          key.day,
          key.slot.as_ref(),
          key.cycle,
          c.target_audience,
          c.body,
          media_urls,
          c.media_alt,
          c.use_og_fallback,
          draft.schedule.label,
          local_str,
          utc_str,
          c.source,
          now_str,
        ],
      )?;
      (id, true)
    }
  };

  let post = require_post(&tx, post_id)?;
  tx.commit()?;
  Ok(UpsertOutcome { post, created })
}

fn update_post_tx(conn: &mut rusqlite::Connection, id: Uuid, patch: &PostPatch) -> Result<Post> {
  let tx = conn.transaction()?;
  let current = require_post(&tx, id)?;
  let mut next = patch.apply_to(&current)?;
  next.updated_at = Utc::now();

  tx.execute(
    "UPDATE posts SET
       target_audience = ?2, body = ?3, media_urls = ?4, media_alt = ?5,
       use_og_fallback = ?6, status = ?7, error = ?8, posted_at = ?9,
       updated_at = ?10
     WHERE post_id = ?1",
    rusqlite::params![
      encode_uuid(id),
      next.content.target_audience,
      next.content.body,
      encode_media_urls(&next.content.media_urls)?,
      next.content.media_alt,
      next.content.use_og_fallback,
      next.status.as_ref(),
      next.error,
      next.posted_at.map(encode_dt),
      encode_dt(next.updated_at),
    ],
  )?;
  tx.commit()?;

  if current.status != next.status {
    tracing::info!(post_id = %id, from = %current.status, to = %next.status, "post status changed");
  }
  Ok(next)
}

fn delete_post_tx(conn: &mut rusqlite::Connection, id: Uuid) -> Result<()> {
  let tx = conn.transaction()?;
  let current = require_post(&tx, id)?;
  if current.status == PostStatus::Posted {
    return Err(Error::Core(cadence_core::Error::invalid_state(
      "cannot delete a posted item",
    )));
  }
  tx.execute("DELETE FROM posts WHERE post_id = ?1", rusqlite::params![encode_uuid(id)])?;
  tx.commit()?;
  Ok(())
}

fn reschedule_posts_tx(
  conn: &mut rusqlite::Connection,
  campaign_id: Uuid,
  offset: FixedOffset,
) -> Result<u64> {
  let tx = conn.transaction()?;
  let campaign = require_campaign(&tx, campaign_id)?;
  let campaign_str = encode_uuid(campaign_id);

  let targets: Vec<(String, i64, String)> = {
    let mut stmt = tx.prepare(
      "SELECT post_id, day, slot FROM posts WHERE campaign_id = ?1 AND status != 'posted'",
    )?;
    stmt
      .query_map(rusqlite::params![campaign_str], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };

  let now_str = encode_dt(Utc::now());
  let mut touched = 0;
  for (post_id, day, slot) in targets {
    let day = u32::try_from(day).map_err(|_| Error::Decode(format!("day out of range: {day}")))?;
    let computed = campaign.schedule.compute(day, decode_slot(&slot)?, offset)?;
    touched += tx.execute(
      "UPDATE posts SET time_label = ?2, scheduled_local = ?3, scheduled_utc = ?4,
         updated_at = ?5
       WHERE post_id = ?1",
      rusqlite::params![
        post_id,
        computed.label,
        encode_local_dt(computed.local),
        encode_dt(computed.utc),
        now_str,
      ],
    )? as u64;
  }

  tx.commit()?;
  Ok(touched)
}

/// Write the final publish state if `token` still holds the claim.
fn complete_publish_tx(
  conn: &mut rusqlite::Connection,
  id: Uuid,
  token: Uuid,
  outcome: &PublishOutcome,
  at: DateTime<Utc>,
) -> Result<Option<Post>> {
  let tx = conn.transaction()?;
  let id_str = encode_uuid(id);
  let token_str = encode_uuid(token);
  let at_str = encode_dt(at);

  let changed = match outcome {
    PublishOutcome::Posted { external_id } => tx.execute(
      "UPDATE posts SET status = 'posted', external_id = ?3, posted_at = ?4,
         error = NULL, claim_token = NULL, claimed_at = NULL, updated_at = ?4
       WHERE post_id = ?1 AND claim_token = ?2
         AND status = 'approved' AND posted_at IS NULL",
      rusqlite::params![id_str, token_str, external_id, at_str],
    )?,
    PublishOutcome::Failed { error } => tx.execute(
      "UPDATE posts SET status = 'failed', error = ?3,
         claim_token = NULL, claimed_at = NULL, updated_at = ?4
       WHERE post_id = ?1 AND claim_token = ?2
         AND status = 'approved' AND posted_at IS NULL",
      rusqlite::params![id_str, token_str, error, at_str],
    )?,
  };

  if changed == 0 {
    return Ok(None);
  }
  let post = require_post(&tx, id)?;
  tx.commit()?;
  Ok(Some(post))
}
