//! Campaigns: a named cadence of two daily slots over a date range.
//!
//! At most one campaign carries the global `is_active` flag at any time. The
//! store enforces that atomically; this module only describes the records
//! and the pure rules for applying a partial update.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, post::validate_media_url, schedule::CampaignSchedule};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a campaign. `Completed` is terminal.
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
pub enum CampaignStatus {
  #[default]
  Draft,
  Active,
  Paused,
  Completed,
}

// ─── Campaign ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
  pub campaign_id:        Uuid,
  /// Unique across all campaigns.
  pub name:               String,
  pub description:        Option<String>,
  #[serde(flatten)]
  pub schedule:           CampaignSchedule,
  /// Image used for posts that opt into a fallback and carry no media.
  pub fallback_image_url: Option<String>,
  pub status:             CampaignStatus,
  /// Whether this is the one globally active campaign.
  pub is_active:          bool,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

impl Campaign {
  /// Eligible for publishing: flagged active and in ACTIVE status.
  pub fn is_live(&self) -> bool {
    self.is_active && self.status == CampaignStatus::Active
  }
}

// ─── NewCampaign ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::CampaignStore::create_campaign`]. New campaigns
/// always start in DRAFT and inactive.
#[derive(Debug, Clone)]
pub struct NewCampaign {
  pub name:               String,
  pub description:        Option<String>,
  pub schedule:           CampaignSchedule,
  pub fallback_image_url: Option<String>,
}

impl NewCampaign {
  pub fn new(name: impl Into<String>, schedule: CampaignSchedule) -> Self {
    Self {
      name: name.into(),
      description: None,
      schedule,
      fallback_image_url: None,
    }
  }

  pub fn validate(&self) -> Result<()> {
    validate_name(&self.name)?;
    self.schedule.validate()?;
    if let Some(url) = &self.fallback_image_url {
      validate_media_url(url)?;
    }
    Ok(())
  }
}

fn validate_name(name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::validation("campaign name must not be empty"));
  }
  Ok(())
}

// ─── CampaignPatch ───────────────────────────────────────────────────────────

/// A partial update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignPatch {
  pub name:               Option<String>,
  pub description:        Option<Option<String>>,
  pub start_date:         Option<NaiveDate>,
  pub total_days:         Option<u32>,
  pub am_time:            Option<NaiveTime>,
  pub pm_time:            Option<NaiveTime>,
  pub fallback_image_url: Option<Option<String>>,
  pub status:             Option<CampaignStatus>,
  pub is_active:          Option<bool>,
}

impl CampaignPatch {
  /// Whether applying this patch must make the campaign the sole active one.
  pub fn requests_activation(&self) -> bool {
    self.is_active == Some(true) || self.status == Some(CampaignStatus::Active)
  }

  /// Apply the patch to `current`, enforcing lifecycle rules. Returns the
  /// would-be campaign; `updated_at` is left for the store to set.
  ///
  /// - COMPLETED is terminal: no status change or activation leaves it.
  /// - Activation sets both `status = Active` and `is_active = true`.
  /// - Moving to DRAFT, PAUSED or COMPLETED clears `is_active`.
  pub fn apply_to(&self, current: &Campaign) -> Result<Campaign> {
    let mut next = current.clone();

    if let Some(name) = &self.name {
      validate_name(name)?;
      next.name = name.clone();
    }
    if let Some(description) = &self.description {
      next.description = description.clone();
    }
    if let Some(start_date) = self.start_date {
      next.schedule.start_date = start_date;
    }
    if let Some(total_days) = self.total_days {
      next.schedule.total_days = total_days;
    }
    if let Some(am_time) = self.am_time {
      next.schedule.am_time = am_time;
    }
    if let Some(pm_time) = self.pm_time {
      next.schedule.pm_time = pm_time;
    }
    next.schedule.validate()?;

    if let Some(fallback) = &self.fallback_image_url {
      if let Some(url) = fallback {
        validate_media_url(url)?;
      }
      next.fallback_image_url = fallback.clone();
    }

    if current.status == CampaignStatus::Completed {
      let leaves_completed = self
        .status
        .is_some_and(|s| s != CampaignStatus::Completed);
      if leaves_completed || self.is_active == Some(true) {
        return Err(Error::invalid_state("campaign is completed"));
      }
    }

    match (self.status, self.is_active) {
      (Some(status), Some(true)) if status != CampaignStatus::Active => {
        return Err(Error::validation(format!(
          "cannot activate a campaign while setting status to {status}"
        )));
      }
      (Some(CampaignStatus::Active), _) | (_, Some(true)) => {
        next.status = CampaignStatus::Active;
        next.is_active = true;
      }
      (Some(status), _) => {
        next.status = status;
        next.is_active = false;
      }
      (None, Some(false)) => next.is_active = false,
      (None, None) => {}
    }

    Ok(next)
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::CampaignStore::list_campaigns`].
#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
  pub status:        Option<CampaignStatus>,
  pub is_active:     Option<bool>,
  /// Case-insensitive substring match on the name.
  pub name_contains: Option<String>,
}
