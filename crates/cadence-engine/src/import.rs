//! The feed import pipeline: parse, make sure the campaign exists, compute
//! schedules, upsert. Per-record failures are reported, never fatal.

use cadence_core::{
  Classify, ErrorKind,
  campaign::{Campaign, CampaignPatch, NewCampaign},
  post::{DEFAULT_CYCLE, PostContent, PostDraft, PostKey, Slot},
  schedule::CampaignSchedule,
  store::{CampaignStore, PostStore},
};
use cadence_feed::FeedItem;
use chrono::{FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, source::FeedSource};

/// Campaign settings supplied with an import. Unset fields keep the stored
/// value, or the default for a new campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignSettings {
  /// Defaults to today in the reference offset for a new campaign.
  pub start_date:         Option<NaiveDate>,
  pub total_days:         Option<u32>,
  pub am_time:            Option<NaiveTime>,
  pub pm_time:            Option<NaiveTime>,
  pub description:        Option<String>,
  pub fallback_image_url: Option<String>,
}

impl CampaignSettings {
  fn is_empty(&self) -> bool {
    self.start_date.is_none()
      && self.total_days.is_none()
      && self.am_time.is_none()
      && self.pm_time.is_none()
      && self.description.is_none()
      && self.fallback_image_url.is_none()
  }

  fn moves_schedule(&self, current: &CampaignSchedule) -> bool {
    self.start_date.is_some_and(|d| d != current.start_date)
      || self.am_time.is_some_and(|t| t != current.am_time)
      || self.pm_time.is_some_and(|t| t != current.pm_time)
  }

  fn patch(&self) -> CampaignPatch {
    CampaignPatch {
      start_date: self.start_date,
      total_days: self.total_days,
      am_time: self.am_time,
      pm_time: self.pm_time,
      description: self.description.clone().map(Some),
      fallback_image_url: self.fallback_image_url.clone().map(Some),
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
  pub source:        FeedSource,
  pub campaign_name: String,
  #[serde(default)]
  pub settings:      CampaignSettings,
  /// Repetition cycle the posts are filed under.
  #[serde(default = "default_cycle")]
  pub cycle:         u32,
}

fn default_cycle() -> u32 { DEFAULT_CYCLE }

/// What happened to one feed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
  Created { post_id: Uuid },
  Updated { post_id: Uuid },
  Failed { kind: ErrorKind, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
  /// Position of the record in the feed array.
  pub index: usize,
  pub day:   Option<u32>,
  pub slot:  Option<Slot>,
  #[serde(flatten)]
  pub status: RecordStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
  pub campaign_id:      Uuid,
  pub campaign_name:    String,
  pub campaign_created: bool,
  pub source:           String,
  pub total:            usize,
  pub created:          usize,
  pub updated:          usize,
  pub failed:           usize,
  /// Posts whose schedule moved because the campaign cadence changed.
  pub rescheduled:      u64,
  pub records:          Vec<RecordOutcome>,
}

/// Import an already-loaded feed document.
pub async fn import_document<S>(
  store: &S,
  offset: FixedOffset,
  request: &ImportRequest,
  document: &str,
) -> Result<ImportReport>
where
  S: CampaignStore + PostStore,
{
  if request.cycle == 0 {
    return Err(cadence_core::Error::validation("cycle is 1-indexed; got 0").into());
  }

  let parsed = cadence_feed::parse_feed(document)?;
  if !parsed.iter().any(|r| r.is_ok()) {
    return Err(cadence_core::Error::EmptySource.into());
  }

  let (campaign, campaign_created, rescheduled) =
    ensure_campaign(store, offset, &request.campaign_name, &request.settings).await?;
  let source = request.source.identifier();

  let mut records = Vec::with_capacity(parsed.len());
  for (index, item) in parsed.into_iter().enumerate() {
    let outcome = match item {
      Ok(item) => {
        let (day, slot) = (item.day, item.slot);
        let status = match upsert_item(store, offset, &campaign, request.cycle, &source, item).await {
          Ok(status) => status,
          Err(e) => failed(&e),
        };
        RecordOutcome { index, day: Some(day), slot: Some(slot), status }
      }
      Err(e) => RecordOutcome { index, day: None, slot: None, status: failed(&e) },
    };
    if let RecordStatus::Failed { error, .. } = &outcome.status {
      tracing::warn!(index, error = %error, "feed record rejected");
    }
    records.push(outcome);
  }

  let count = |f: fn(&RecordStatus) -> bool| records.iter().filter(|r| f(&r.status)).count();
  let report = ImportReport {
    campaign_id: campaign.campaign_id,
    campaign_name: campaign.name.clone(),
    campaign_created,
    total: records.len(),
    created: count(|s| matches!(s, RecordStatus::Created { .. })),
    updated: count(|s| matches!(s, RecordStatus::Updated { .. })),
    failed: count(|s| matches!(s, RecordStatus::Failed { .. })),
    rescheduled,
    source,
    records,
  };

  tracing::info!(
    campaign = %report.campaign_name,
    source = %report.source,
    total = report.total,
    created = report.created,
    updated = report.updated,
    failed = report.failed,
    "feed imported"
  );
  Ok(report)
}

fn failed<E: std::error::Error + Classify>(e: &E) -> RecordStatus {
  RecordStatus::Failed { kind: e.kind(), error: e.to_string() }
}

/// Find or create the target campaign and bring its settings up to date.
/// Returns the campaign, whether it was created, and how many posts were
/// rescheduled.
async fn ensure_campaign<S>(
  store: &S,
  offset: FixedOffset,
  name: &str,
  settings: &CampaignSettings,
) -> Result<(Campaign, bool, u64)>
where
  S: CampaignStore + PostStore,
{
  let existing = store.get_campaign_by_name(name).await.map_err(Error::store)?;

  let Some(current) = existing else {
    let today = Utc::now().with_timezone(&offset).date_naive();
    let mut schedule = CampaignSchedule::starting(settings.start_date.unwrap_or(today));
    if let Some(days) = settings.total_days {
      schedule.total_days = days;
    }
    if let Some(t) = settings.am_time {
      schedule.am_time = t;
    }
    if let Some(t) = settings.pm_time {
      schedule.pm_time = t;
    }
    let mut input = NewCampaign::new(name, schedule);
    input.description = settings.description.clone();
    input.fallback_image_url = settings.fallback_image_url.clone();

    let campaign = store.create_campaign(input).await.map_err(Error::store)?;
    return Ok((campaign, true, 0));
  };

  if settings.is_empty() {
    return Ok((current, false, 0));
  }

  let moves = settings.moves_schedule(&current.schedule);
  let campaign = store
    .update_campaign(current.campaign_id, settings.patch())
    .await
    .map_err(Error::store)?;
  let rescheduled = if moves {
    store
      .reschedule_posts(campaign.campaign_id, offset)
      .await
      .map_err(Error::store)?
  } else {
    0
  };
  Ok((campaign, false, rescheduled))
}

async fn upsert_item<S: PostStore>(
  store: &S,
  offset: FixedOffset,
  campaign: &Campaign,
  cycle: u32,
  source: &str,
  item: FeedItem,
) -> Result<RecordStatus> {
  let schedule = campaign.schedule.compute(item.day, item.slot, offset)?;
  let draft = PostDraft {
    key: PostKey { campaign_id: campaign.campaign_id, day: item.day, slot: item.slot, cycle },
    content: PostContent {
      target_audience: item.target_audience,
      body:            item.body,
      media_urls:      item.media_urls,
      media_alt:       item.media_alt,
      use_og_fallback: true,
      source:          Some(source.to_owned()),
    },
    schedule,
  };

  let outcome = store.upsert_post(draft).await.map_err(Error::store)?;
  let post_id = outcome.post.post_id;
  Ok(if outcome.created {
    RecordStatus::Created { post_id }
  } else {
    RecordStatus::Updated { post_id }
  })
}
