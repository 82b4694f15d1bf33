//! Subcommand dispatch. Each command resolves to a JSON value or an engine
//! error; the caller wraps either in the output envelope.

use cadence_core::{
  campaign::{Campaign, CampaignFilter, CampaignPatch, NewCampaign},
  post::{PostPatch, PostQuery, PostStatus},
  schedule::CampaignSchedule,
  store::{CampaignStore, PostStore},
};
use cadence_engine::{
  Engine, EngineConfig, Error, Result,
  import::{CampaignSettings, ImportRequest},
  publish::PublishReport,
  source::FeedSource,
  x::XClient,
};
use cadence_store_sqlite::SqliteStore;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::cli::{CampaignCommand, Command, ImportArgs, PostCommand, ScheduleArgs};

pub async fn run(
  engine: &Engine<SqliteStore>,
  config: &EngineConfig,
  command: Command,
) -> Result<Value> {
  match command {
    Command::Campaign(cmd) => campaign(engine, cmd).await,
    Command::Post(cmd) => post(engine, cmd).await,
    Command::Import(args) => {
      let report = engine.import_feed(&import_request(args)?).await?;
      to_value(&report)
    }
    Command::Publish { slot, dry_run } => {
      let report = if dry_run {
        PublishReport::DryRun { payload: engine.preview_due(slot).await? }
      } else {
        engine.publish_due(&x_client(config)?, slot, false).await?
      };
      to_value(&report)
    }
    Command::Stats { campaign } => {
      let campaign = resolve_campaign(engine, &campaign).await?;
      let counts = engine
        .store()
        .status_counts(campaign.campaign_id)
        .await
        .map_err(Error::store)?;
      Ok(json!({
        "campaign_id": campaign.campaign_id,
        "name": campaign.name,
        "total": counts.total(),
        "counts": counts,
      }))
    }
    Command::Verify => {
      let identity = cadence_engine::verify(&x_client(config)?).await?;
      to_value(&identity)
    }
  }
}

fn x_client(config: &EngineConfig) -> Result<XClient> {
  XClient::new(&config.x).map_err(|e| Error::Config(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
  Ok(serde_json::to_value(value).map_err(cadence_core::Error::from)?)
}

/// Look a campaign up by id, or by exact name when the argument is not a
/// UUID.
async fn resolve_campaign(engine: &Engine<SqliteStore>, reference: &str) -> Result<Campaign> {
  let store = engine.store();
  match Uuid::parse_str(reference) {
    Ok(id) => store
      .get_campaign(id)
      .await
      .map_err(Error::store)?
      .ok_or(cadence_core::Error::CampaignNotFound(id).into()),
    Err(_) => store
      .get_campaign_by_name(reference)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| cadence_core::Error::CampaignNameNotFound(reference.to_owned()).into()),
  }
}

// ─── Campaigns ────────────────────────────────────────────────────────────────

async fn campaign(engine: &Engine<SqliteStore>, cmd: CampaignCommand) -> Result<Value> {
  let store = engine.store();
  match cmd {
    CampaignCommand::Create { name, description, fallback_image, schedule } => {
      let today = Utc::now().with_timezone(&engine.offset()).date_naive();
      let mut input = NewCampaign::new(name, schedule.into_schedule(today));
      input.description = description;
      input.fallback_image_url = fallback_image;
      to_value(&store.create_campaign(input).await.map_err(Error::store)?)
    }

    CampaignCommand::List { status, active, name } => {
      let filter = CampaignFilter {
        status,
        is_active: active.then_some(true),
        name_contains: name,
      };
      to_value(&store.list_campaigns(&filter).await.map_err(Error::store)?)
    }

    CampaignCommand::Show { campaign } => to_value(&resolve_campaign(engine, &campaign).await?),

    CampaignCommand::Update {
      campaign,
      name,
      description,
      clear_description,
      fallback_image,
      clear_fallback_image,
      status,
      schedule,
    } => {
      let id = resolve_campaign(engine, &campaign).await?.campaign_id;
      let patch = CampaignPatch {
        name,
        description: clearable(description, clear_description),
        start_date: schedule.start_date,
        total_days: schedule.total_days,
        am_time: schedule.am_time,
        pm_time: schedule.pm_time,
        fallback_image_url: clearable(fallback_image, clear_fallback_image),
        status,
        is_active: None,
      };
      to_value(&engine.update_campaign(id, patch).await?)
    }

    CampaignCommand::Activate { campaign } => {
      let id = resolve_campaign(engine, &campaign).await?.campaign_id;
      to_value(&store.set_active(id).await.map_err(Error::store)?)
    }

    CampaignCommand::Delete { campaign } => {
      let id = resolve_campaign(engine, &campaign).await?.campaign_id;
      store.delete_campaign(id).await.map_err(Error::store)?;
      Ok(json!({ "deleted": id }))
    }
  }
}

/// `Some(None)` clears a nullable field, `Some(Some(_))` sets it.
fn clearable(value: Option<String>, clear: bool) -> Option<Option<String>> {
  if clear { Some(None) } else { value.map(Some) }
}

impl ScheduleArgs {
  fn into_schedule(self, default_start: chrono::NaiveDate) -> CampaignSchedule {
    let mut schedule = CampaignSchedule::starting(self.start_date.unwrap_or(default_start));
    if let Some(days) = self.total_days {
      schedule.total_days = days;
    }
    if let Some(t) = self.am_time {
      schedule.am_time = t;
    }
    if let Some(t) = self.pm_time {
      schedule.pm_time = t;
    }
    schedule
  }
}

// ─── Posts ────────────────────────────────────────────────────────────────────

async fn post(engine: &Engine<SqliteStore>, cmd: PostCommand) -> Result<Value> {
  let store = engine.store();
  match cmd {
    PostCommand::List { campaign, status, day, slot, cycle, search, page, limit } => {
      let campaign_id = match campaign {
        Some(reference) => Some(resolve_campaign(engine, &reference).await?.campaign_id),
        None => None,
      };
      let query = PostQuery {
        campaign_id,
        campaign_name: None,
        status,
        day,
        slot,
        cycle,
        search,
        page,
        limit,
      };
      to_value(&store.list_posts(&query).await.map_err(Error::store)?)
    }

    PostCommand::Show { id } => {
      let post = store
        .get_post(id)
        .await
        .map_err(Error::store)?
        .ok_or(cadence_core::Error::PostNotFound(id))?;
      to_value(&post)
    }

    PostCommand::Update {
      id,
      body,
      audience,
      media,
      clear_media,
      alt,
      clear_alt,
      og_fallback,
      status,
    } => {
      let media_urls = if clear_media {
        Some(Vec::new())
      } else {
        (!media.is_empty()).then_some(media)
      };
      let patch = PostPatch {
        target_audience: audience,
        body,
        media_urls,
        media_alt: clearable(alt, clear_alt),
        use_og_fallback: og_fallback,
        status,
        error: None,
      };
      to_value(&store.update_post(id, patch).await.map_err(Error::store)?)
    }

    PostCommand::Approve { id } => {
      let patch = PostPatch::status(PostStatus::Approved);
      to_value(&store.update_post(id, patch).await.map_err(Error::store)?)
    }

    PostCommand::ApproveAll { campaign, from_day, to_day, include_failed } => {
      let id = resolve_campaign(engine, &campaign).await?.campaign_id;
      let days = from_day.zip(to_day);
      let approved = store
        .approve_posts(id, days, include_failed)
        .await
        .map_err(Error::store)?;
      Ok(json!({ "campaign_id": id, "approved": approved }))
    }

    PostCommand::Delete { id } => {
      store.delete_post(id).await.map_err(Error::store)?;
      Ok(json!({ "deleted": id }))
    }
  }
}

// ─── Import ───────────────────────────────────────────────────────────────────

fn import_request(args: ImportArgs) -> Result<ImportRequest> {
  let source = match (args.source.local, args.source.remote) {
    (Some(name), _) => FeedSource::Local(name),
    (None, Some(url)) => FeedSource::Remote(url),
    (None, None) => {
      return Err(cadence_core::Error::validation("one of --local or --remote is required").into());
    }
  };
  Ok(ImportRequest {
    source,
    campaign_name: args.campaign,
    settings: CampaignSettings {
      start_date:         args.schedule.start_date,
      total_days:         args.schedule.total_days,
      am_time:            args.schedule.am_time,
      pm_time:            args.schedule.pm_time,
      description:        args.description,
      fallback_image_url: args.fallback_image,
    },
    cycle: args.cycle,
  })
}

#[cfg(test)]
mod tests {
  use cadence_core::{Classify, ErrorKind, post::Slot};
  use cadence_engine::import::import_document;
  use chrono::NaiveDate;

  use super::*;

  /// An engine with one approved, overdue post and no X credentials.
  async fn live_engine() -> (Engine<SqliteStore>, EngineConfig) {
    let config = EngineConfig::default();
    let store = SqliteStore::open_in_memory().await.unwrap();
    let engine = Engine::new(store, &config).unwrap();

    let request = ImportRequest {
      source:        FeedSource::Local("q1.json".into()),
      campaign_name: "Q1".into(),
      settings:      CampaignSettings {
        start_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        ..Default::default()
      },
      cycle:         1,
    };
    let feed = r#"[{"day":1,"time":"1:00 ظهرًا","target_audience":"general","content":"Hello"}]"#;
    let report = import_document(engine.store(), engine.offset(), &request, feed).await.unwrap();
    engine.store().approve_posts(report.campaign_id, None, false).await.unwrap();
    engine.store().set_active(report.campaign_id).await.unwrap();
    (engine, config)
  }

  #[tokio::test]
  async fn dry_run_publish_needs_no_credentials() {
    let (engine, config) = live_engine().await;

    let value = run(&engine, &config, Command::Publish { slot: Slot::Am, dry_run: true })
      .await
      .unwrap();
    assert_eq!(value["outcome"], "dry_run");
    assert_eq!(value["payload"]["text"], "Hello");

    // A real publish still needs the token.
    let err = run(&engine, &config, Command::Publish { slot: Slot::Am, dry_run: false })
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
  }
}
