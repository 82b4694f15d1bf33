//! [`CampaignStore`] implementation.

use cadence_core::{
  campaign::{Campaign, CampaignFilter, CampaignPatch, CampaignStatus, NewCampaign},
  store::CampaignStore,
};
use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result, SqliteStore,
  encode::{
    CAMPAIGN_COLUMNS, RawCampaign, contains_pattern, encode_date, encode_dt, encode_time,
    encode_uuid,
  },
  store::{is_unique_violation, require_campaign},
};

impl CampaignStore for SqliteStore {
  async fn create_campaign(&self, input: NewCampaign) -> Result<Campaign> {
    input.validate()?;

    let now = Utc::now();
    let campaign = Campaign {
      campaign_id:        Uuid::new_v4(),
      name:               input.name,
      description:        input.description,
      schedule:           input.schedule,
      fallback_image_url: input.fallback_image_url,
      status:             CampaignStatus::Draft,
      is_active:          false,
      created_at:         now,
      updated_at:         now,
    };

    let row = campaign.clone();
    self
      .conn
      .call(move |conn| Ok(insert_campaign(conn, &row)))
      .await??;

    tracing::info!(campaign_id = %campaign.campaign_id, name = %campaign.name, "campaign created");
    Ok(campaign)
  }

  async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
    self
      .conn
      .call(move |conn| Ok(crate::store::load_campaign(conn, id)))
      .await?
  }

  async fn get_campaign_by_name(&self, name: &str) -> Result<Option<Campaign>> {
    let name = name.to_owned();

    let raw: Option<RawCampaign> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE name = ?1"),
              rusqlite::params![name],
              RawCampaign::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCampaign::into_campaign).transpose()
  }

  async fn list_campaigns(&self, filter: &CampaignFilter) -> Result<Vec<Campaign>> {
    let mut conds: Vec<String> = vec![];
    let mut args: Vec<Value> = vec![];

    if let Some(status) = filter.status {
      args.push(Value::Text(status.as_ref().to_owned()));
      conds.push(format!("status = ?{}", args.len()));
    }
    if let Some(is_active) = filter.is_active {
      args.push(Value::Integer(i64::from(is_active)));
      conds.push(format!("is_active = ?{}", args.len()));
    }
    if let Some(text) = &filter.name_contains {
      args.push(Value::Text(contains_pattern(&text.to_lowercase())));
      conds.push(format!("LOWER(name) LIKE ?{} ESCAPE '\\'", args.len()));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let sql = format!(
      "SELECT {CAMPAIGN_COLUMNS} FROM campaigns {where_clause} ORDER BY created_at, name"
    );

    let raws: Vec<RawCampaign> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RawCampaign::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCampaign::into_campaign).collect()
  }

  async fn update_campaign(&self, id: Uuid, patch: CampaignPatch) -> Result<Campaign> {
    let activating = patch.requests_activation();
    let campaign = self
      .conn
      .call(move |conn| Ok(update_campaign_tx(conn, id, &patch)))
      .await??;

    if activating {
      tracing::info!(campaign_id = %id, name = %campaign.name, "campaign activated");
    }
    Ok(campaign)
  }

  async fn set_active(&self, id: Uuid) -> Result<Campaign> {
    let patch = CampaignPatch { is_active: Some(true), ..Default::default() };
    self.update_campaign(id, patch).await
  }

  async fn delete_campaign(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM campaigns WHERE campaign_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    if deleted == 0 {
      return Err(cadence_core::Error::CampaignNotFound(id).into());
    }
    tracing::info!(campaign_id = %id, "campaign deleted with its posts");
    Ok(())
  }
}

// ─── Transaction bodies ──────────────────────────────────────────────────────

fn insert_campaign(conn: &rusqlite::Connection, c: &Campaign) -> Result<()> {
  let res = conn.execute(
    "INSERT INTO campaigns (
       campaign_id, name, description, start_date, total_days, am_time, pm_time,
       fallback_image_url, status, is_active, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    rusqlite::params![
      encode_uuid(c.campaign_id),
      c.name,
      c.description,
      encode_date(c.schedule.start_date),
      c.schedule.total_days,
      encode_time(c.schedule.am_time),
      encode_time(c.schedule.pm_time),
      c.fallback_image_url,
      c.status.as_ref(),
      c.is_active,
      encode_dt(c.created_at),
      encode_dt(c.updated_at),
    ],
  );
  match res {
    Ok(_) => Ok(()),
    Err(e) if is_unique_violation(&e) => {
      Err(cadence_core::Error::DuplicateName(c.name.clone()).into())
    }
    Err(e) => Err(e.into()),
  }
}

/// Apply `patch` to campaign `id` in one transaction. Activation clears the
/// flag on every other campaign before setting it on `id`.
fn update_campaign_tx(
  conn: &mut rusqlite::Connection,
  id: Uuid,
  patch: &CampaignPatch,
) -> Result<Campaign> {
  let tx = conn.transaction()?;
  let current = require_campaign(&tx, id)?;
  let mut next = patch.apply_to(&current)?;
  let id_str = encode_uuid(id);

  if next.schedule.total_days < current.schedule.total_days {
    let max_day: Option<i64> = tx.query_row(
      "SELECT MAX(day) FROM posts WHERE campaign_id = ?1",
      rusqlite::params![id_str],
      |r| r.get(0),
    )?;
    if let Some(max_day) = max_day
      && max_day > i64::from(next.schedule.total_days)
    {
      return Err(Error::Core(cadence_core::Error::validation(format!(
        "total_days {} is shorter than existing post day {max_day}",
        next.schedule.total_days
      ))));
    }
  }

  next.updated_at = Utc::now();
  let now_str = encode_dt(next.updated_at);

  if next.is_active {
    tx.execute(
      "UPDATE campaigns SET is_active = 0, updated_at = ?2
       WHERE is_active = 1 AND campaign_id != ?1",
      rusqlite::params![id_str, now_str],
    )?;
  }

  let res = tx.execute(
    "UPDATE campaigns SET
       name = ?2, description = ?3, start_date = ?4, total_days = ?5,
       am_time = ?6, pm_time = ?7, fallback_image_url = ?8, status = ?9,
       is_active = ?10, updated_at = ?11
     WHERE campaign_id = ?1",
    rusqlite::params![
      id_str,
      next.name,
      next.description,
      encode_date(next.schedule.start_date),
      next.schedule.total_days,
      encode_time(next.schedule.am_time),
      encode_time(next.schedule.pm_time),
      next.fallback_image_url,
      next.status.as_ref(),
      next.is_active,
      now_str,
    ],
  );
  match res {
    Ok(_) => {}
    Err(e) if is_unique_violation(&e) => {
      return Err(cadence_core::Error::DuplicateName(next.name.clone()).into());
    }
    Err(e) => return Err(e.into()),
  }

  tx.commit()?;
  Ok(next)
}
