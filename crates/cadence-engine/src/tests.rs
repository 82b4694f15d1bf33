//! End-to-end tests of import and publish against an in-memory store and an
//! in-process fake network.

use std::{
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use cadence_core::{
  Classify, ErrorKind,
  campaign::CampaignPatch,
  network::{Identity, MediaUpload, SocialNetwork},
  post::{CLAIM_LEASE_SECS, PostQuery, PostStatus, Slot},
  schedule::parse_time_of_day,
  store::{CampaignStore, PostStore},
};
use cadence_store_sqlite::SqliteStore;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use wiremock::{
  Mock, MockServer, ResponseTemplate,
  matchers::{method, path},
};

use crate::{
  Engine, EngineConfig,
  import::{CampaignSettings, ImportRequest, RecordStatus, import_document},
  publish::PublishReport,
  source::FeedSource,
};

// ─── Fake network ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FakeError(String);

#[derive(Default)]
struct FakeNetwork {
  fail_post:  bool,
  /// `post_text` never answers.
  stall_post: bool,
  attempts:   AtomicUsize,
  uploads:    Mutex<Vec<MediaUpload>>,
  posts:      Mutex<Vec<(String, Vec<String>)>>,
  next_id:    AtomicUsize,
}

impl FakeNetwork {
  fn failing() -> Self { Self { fail_post: true, ..Default::default() } }

  fn stalling() -> Self { Self { stall_post: true, ..Default::default() } }

  fn attempts(&self) -> usize { self.attempts.load(Ordering::SeqCst) }

  fn post_count(&self) -> usize { self.posts.lock().unwrap().len() }

  fn upload_count(&self) -> usize { self.uploads.lock().unwrap().len() }
}

impl SocialNetwork for FakeNetwork {
  type Error = FakeError;

  async fn verify(&self) -> Result<Identity, FakeError> {
    Ok(Identity { id: "1".into(), handle: "agency".into(), name: None })
  }

  async fn upload_media(&self, media: MediaUpload) -> Result<String, FakeError> {
    let n = self.next_id.fetch_add(1, Ordering::SeqCst);
    self.uploads.lock().unwrap().push(media);
    Ok(format!("media-{n}"))
  }

  async fn post_text(&self, text: &str, media_ids: &[String]) -> Result<String, FakeError> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    if self.stall_post {
      std::future::pending::<()>().await;
    }
    if self.fail_post {
      return Err(FakeError("503 service unavailable".into()));
    }
    self.posts.lock().unwrap().push((text.to_owned(), media_ids.to_vec()));
    Ok("12345".into())
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn engine() -> Engine<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Engine::new(store, &EngineConfig::default()).unwrap()
}

fn q1_request() -> ImportRequest {
  ImportRequest {
    source:        FeedSource::Local("q1.json".into()),
    campaign_name: "Q1".into(),
    settings:      CampaignSettings {
      start_date: Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
      am_time: Some(parse_time_of_day("13:00").unwrap()),
      pm_time: Some(parse_time_of_day("20:30").unwrap()),
      ..Default::default()
    },
    cycle:         1,
  }
}

const SCENARIO_B: &str =
  r#"[{"day":1,"time":"1:00 ظهرًا","target_audience":"general","content":"Hello"}]"#;

fn jan1_10utc() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap() }

/// Import `document` into Q1, approve everything and activate Q1.
async fn live_q1(engine: &Engine<SqliteStore>, document: &str) {
  let report = import_document(engine.store(), engine.offset(), &q1_request(), document)
    .await
    .unwrap();
  let store = engine.store();
  store.approve_posts(report.campaign_id, None, false).await.unwrap();
  store.set_active(report.campaign_id).await.unwrap();
}

async fn only_post(engine: &Engine<SqliteStore>) -> cadence_core::post::Post {
  let page = engine.store().list_posts(&PostQuery::default()).await.unwrap();
  assert_eq!(page.total, 1);
  page.items.into_iter().next().unwrap()
}

// ─── Import ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_b_import_creates_one_morning_post() {
  let engine = engine().await;
  let report = import_document(engine.store(), engine.offset(), &q1_request(), SCENARIO_B)
    .await
    .unwrap();

  assert!(report.campaign_created);
  assert_eq!((report.total, report.created, report.updated, report.failed), (1, 1, 0, 0));
  assert_eq!(report.source, "import:local:q1.json");

  let post = only_post(&engine).await;
  assert_eq!(post.slot, Slot::Am);
  assert_eq!(post.day, 1);
  assert_eq!(post.status, PostStatus::Draft);
  assert_eq!(post.scheduled_local.to_rfc3339(), "2025-01-01T13:00:00+03:00");
  assert_eq!(post.scheduled_utc, jan1_10utc());
  assert_eq!(post.content.source.as_deref(), Some("import:local:q1.json"));
}

#[tokio::test]
async fn reimport_updates_instead_of_duplicating() {
  let engine = engine().await;
  let offset = engine.offset();
  import_document(engine.store(), offset, &q1_request(), SCENARIO_B).await.unwrap();

  let edited = SCENARIO_B.replace("Hello", "Hello again");
  let report = import_document(engine.store(), offset, &q1_request(), &edited).await.unwrap();
  assert!(!report.campaign_created);
  assert_eq!((report.created, report.updated), (0, 1));
  assert_eq!(only_post(&engine).await.content.body, "Hello again");
}

#[tokio::test]
async fn bad_records_are_reported_alongside_good_ones() {
  let engine = engine().await;
  let feed = r#"[
    {"day":1,"time":"1:00 ظهرًا","target_audience":"general","content":"Hello"},
    {"day":1,"time":"sometime","target_audience":"general","content":"no slot"},
    {"day":2,"time":"8:30 مساءً","target_audience":"general","content":"Evening"}
  ]"#;
  let report = import_document(engine.store(), engine.offset(), &q1_request(), feed)
    .await
    .unwrap();

  assert_eq!((report.total, report.created, report.failed), (3, 2, 1));
  let bad = &report.records[1];
  assert_eq!(bad.index, 1);
  assert!(matches!(bad.status, RecordStatus::Failed { kind: ErrorKind::Validation, .. }));
}

#[tokio::test]
async fn day_beyond_campaign_span_fails_that_record_only() {
  let engine = engine().await;
  let mut request = q1_request();
  request.settings.total_days = Some(10);
  let feed = r#"[
    {"day":10,"time":"13:00","target_audience":"a","content":"last day"},
    {"day":11,"time":"13:00","target_audience":"a","content":"past the end"}
  ]"#;
  let report = import_document(engine.store(), engine.offset(), &request, feed)
    .await
    .unwrap();
  assert_eq!((report.created, report.failed), (1, 1));
}

#[tokio::test]
async fn feed_without_valid_records_is_rejected_before_any_write() {
  let engine = engine().await;
  let feed = r#"[{"day":99,"time":"13:00","target_audience":"a","content":"x"}]"#;
  let err = import_document(engine.store(), engine.offset(), &q1_request(), feed)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::EmptySource);
  assert!(engine.store().get_campaign_by_name("Q1").await.unwrap().is_none());

  let err = import_document(engine.store(), engine.offset(), &q1_request(), "[]")
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::EmptySource);
}

#[tokio::test]
async fn import_with_new_start_date_reschedules_existing_posts() {
  let engine = engine().await;
  let offset = engine.offset();
  import_document(engine.store(), offset, &q1_request(), SCENARIO_B).await.unwrap();

  // A feed for other days still moves the day-1 post with the campaign.
  let mut request = q1_request();
  request.settings.start_date = NaiveDate::from_ymd_opt(2025, 3, 1);
  let other = r#"[{"day":2,"time":"20:30","target_audience":"a","content":"x"}]"#;
  let report = import_document(engine.store(), offset, &request, other).await.unwrap();
  assert_eq!(report.rescheduled, 1);

  let page = engine
    .store()
    .list_posts(&PostQuery { day: Some(1), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.items[0].scheduled_utc, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
}

#[tokio::test]
async fn import_reads_allow_listed_local_feed() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("q1.json"), SCENARIO_B).unwrap();

  let mut config = EngineConfig::default();
  config.feed.local_dir = dir.path().to_path_buf();
  config.feed.allowed_files = vec!["q1.json".into()];
  let store = SqliteStore::open_in_memory().await.unwrap();
  let engine = Engine::new(store, &config).unwrap();

  let report = engine.import_feed(&q1_request()).await.unwrap();
  assert_eq!(report.created, 1);

  let mut outside = q1_request();
  outside.source = FeedSource::Local("other.json".into());
  let err = engine.import_feed(&outside).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

// ─── Campaign updates ────────────────────────────────────────────────────────

#[tokio::test]
async fn moving_slot_time_reschedules_posts() {
  let engine = engine().await;
  let report = import_document(engine.store(), engine.offset(), &q1_request(), SCENARIO_B)
    .await
    .unwrap();

  let patch = CampaignPatch {
    am_time: Some(parse_time_of_day("09:15").unwrap()),
    ..Default::default()
  };
  engine.update_campaign(report.campaign_id, patch).await.unwrap();

  let post = only_post(&engine).await;
  assert_eq!(post.scheduled_utc, Utc.with_ymd_and_hms(2025, 1, 1, 6, 15, 0).unwrap());
  // Labels are canonical, not derived from the configured minute.
  assert_eq!(post.time_label, "1:00 ظهرًا");
}

// ─── Publish ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_c_dry_run_sends_nothing() {
  let engine = engine().await;
  live_q1(&engine, SCENARIO_B).await;
  let net = FakeNetwork::default();

  let report = engine
    .publish_due_at(&net, Slot::Am, true, jan1_10utc())
    .await
    .unwrap();
  let PublishReport::DryRun { payload } = report else { panic!("expected a dry run") };
  assert_eq!(payload.text, "Hello");
  assert_eq!(payload.scheduled_utc, jan1_10utc());
  assert_eq!(payload.label, "1:00 ظهرًا");
  assert!(payload.fallback_image.is_none());

  assert_eq!(net.post_count(), 0);
  assert_eq!(only_post(&engine).await.status, PostStatus::Approved);
}

#[tokio::test]
async fn preview_matches_the_dry_run_without_a_network() {
  let engine = engine().await;
  live_q1(&engine, SCENARIO_B).await;

  let payload = engine.preview_due_at(Slot::Am, jan1_10utc()).await.unwrap();
  assert_eq!(payload.text, "Hello");
  assert_eq!(payload.post_id, only_post(&engine).await.post_id);

  let early = jan1_10utc() - chrono::TimeDelta::minutes(1);
  let err = engine.preview_due_at(Slot::Am, early).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NoDuePost);
}

#[tokio::test]
async fn scenario_d_publish_then_nothing_due() {
  let engine = engine().await;
  live_q1(&engine, SCENARIO_B).await;
  let net = FakeNetwork::default();

  let report = engine
    .publish_due_at(&net, Slot::Am, false, jan1_10utc())
    .await
    .unwrap();
  assert!(matches!(report, PublishReport::Posted { ref external_id, .. } if external_id == "12345"));

  let post = only_post(&engine).await;
  assert_eq!(post.status, PostStatus::Posted);
  assert_eq!(post.external_id.as_deref(), Some("12345"));
  assert_eq!(post.posted_at, Some(jan1_10utc()));
  assert!(post.error.is_none());

  let again = engine
    .publish_due_at(&net, Slot::Am, false, jan1_10utc())
    .await
    .unwrap_err();
  assert_eq!(again.kind(), ErrorKind::NoDuePost);
  assert_eq!(net.post_count(), 1);
}

#[tokio::test]
async fn scenario_e_no_active_campaign() {
  let engine = engine().await;
  import_document(engine.store(), engine.offset(), &q1_request(), SCENARIO_B)
    .await
    .unwrap();
  let net = FakeNetwork::default();

  let err = engine
    .publish_due_at(&net, Slot::Pm, false, jan1_10utc())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NoActiveCampaign);
  assert_eq!(only_post(&engine).await.status, PostStatus::Draft);
  assert_eq!(net.post_count(), 0);
}

#[tokio::test]
async fn paused_campaign_is_not_live() {
  let engine = engine().await;
  live_q1(&engine, SCENARIO_B).await;
  let campaign = engine.active_campaign().await.unwrap();
  let pause = CampaignPatch {
    status: Some(cadence_core::campaign::CampaignStatus::Paused),
    ..Default::default()
  };
  engine.update_campaign(campaign.campaign_id, pause).await.unwrap();

  let err = engine.active_campaign().await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NoActiveCampaign);
}

#[tokio::test]
async fn post_is_not_due_before_its_instant() {
  let engine = engine().await;
  live_q1(&engine, SCENARIO_B).await;
  let net = FakeNetwork::default();

  let early = jan1_10utc() - chrono::TimeDelta::minutes(1);
  let err = engine.publish_due_at(&net, Slot::Am, false, early).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NoDuePost);
}

#[tokio::test]
async fn concurrent_publishes_post_once() {
  let engine = engine().await;
  live_q1(&engine, SCENARIO_B).await;
  let net = FakeNetwork::default();

  let (a, b) = tokio::join!(
    engine.publish_due_at(&net, Slot::Am, false, jan1_10utc()),
    engine.publish_due_at(&net, Slot::Am, false, jan1_10utc()),
  );
  let results = [a, b];
  let posted = results.iter().filter(|r| r.is_ok()).count();
  assert_eq!(posted, 1);
  let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
  assert_eq!(loser.kind(), ErrorKind::NoDuePost);
  assert_eq!(net.post_count(), 1);
}

#[tokio::test]
async fn failed_publish_is_recorded_on_the_post() {
  let engine = engine().await;
  live_q1(&engine, SCENARIO_B).await;
  let net = FakeNetwork::failing();

  let err = engine
    .publish_due_at(&net, Slot::Am, false, jan1_10utc())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PublishFailed);

  let post = only_post(&engine).await;
  assert_eq!(post.status, PostStatus::Failed);
  assert!(post.posted_at.is_none());
  assert!(post.error.as_deref().unwrap().contains("503"));

  // A failed post waits for re-approval instead of being retried.
  let err = engine
    .publish_due_at(&FakeNetwork::default(), Slot::Am, false, jan1_10utc())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NoDuePost);
}

#[tokio::test]
async fn stalled_network_is_failed_before_the_claim_lapses() {
  let mut engine = engine().await;
  engine.publish_deadline = Duration::from_millis(50);
  live_q1(&engine, SCENARIO_B).await;
  let net = FakeNetwork::stalling();

  let err = engine
    .publish_due_at(&net, Slot::Am, false, jan1_10utc())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PublishFailed);

  let post = only_post(&engine).await;
  assert_eq!(post.status, PostStatus::Failed);
  assert!(post.posted_at.is_none());
  assert!(post.error.as_deref().unwrap().contains("no outcome within"));

  // Past the lease the post is still not handed to the network again.
  let later = jan1_10utc() + chrono::TimeDelta::seconds(CLAIM_LEASE_SECS + 1);
  let err = engine
    .publish_due_at(&net, Slot::Am, false, later)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NoDuePost);
  assert_eq!(net.attempts(), 1);
}

#[tokio::test]
async fn default_engine_deadline_is_inside_the_lease() {
  let engine = engine().await;
  assert!(engine.publish_deadline < Duration::from_secs(CLAIM_LEASE_SECS as u64));

  let mut config = EngineConfig::default();
  config.x.timeout_secs = 120;
  let store = SqliteStore::open_in_memory().await.unwrap();
  let err = Engine::new(store, &config).err().unwrap();
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn one_failed_upload_does_not_block_the_text() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/a.png"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 32]))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/b.png"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&server)
    .await;

  let a = format!("{}/a.png", server.uri());
  let b = format!("{}/b.png", server.uri());
  let feed = serde_json::json!([{
    "day": 1, "time": "13:00", "target_audience": "general", "content": "With pictures",
    "mediaUrls": [a, b], "mediaAlt": "two pictures"
  }])
  .to_string();

  let engine = engine().await;
  live_q1(&engine, &feed).await;
  let net = FakeNetwork::default();

  let report = engine
    .publish_due_at(&net, Slot::Am, false, jan1_10utc())
    .await
    .unwrap();
  let PublishReport::Posted { media_ids, media_dropped, .. } = report else {
    panic!("expected a posted report")
  };
  assert_eq!(media_ids.len(), 1);
  assert_eq!(media_dropped, vec![b]);

  let uploads = net.uploads.lock().unwrap();
  assert_eq!(uploads.len(), 1);
  assert_eq!(uploads[0].media_type, "image/png");
  assert_eq!(uploads[0].alt_text.as_deref(), Some("two pictures"));
  drop(uploads);

  let posts = net.posts.lock().unwrap();
  assert_eq!(posts[0], ("With pictures".to_string(), media_ids));
  drop(posts);
  assert_eq!(only_post(&engine).await.status, PostStatus::Posted);
}

#[tokio::test]
async fn fallback_image_is_attached_when_post_has_no_media() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/fallback.jpg"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 8]))
    .mount(&server)
    .await;

  let mut config = EngineConfig::default();
  config.media.default_fallback_image = Some(format!("{}/fallback.jpg", server.uri()));
  let store = SqliteStore::open_in_memory().await.unwrap();
  let engine = Engine::new(store, &config).unwrap();
  live_q1(&engine, SCENARIO_B).await;
  let net = FakeNetwork::default();

  let dry = engine
    .publish_due_at(&net, Slot::Am, true, jan1_10utc())
    .await
    .unwrap();
  let PublishReport::DryRun { payload } = dry else { panic!("expected a dry run") };
  assert_eq!(payload.fallback_image, config.media.default_fallback_image);
  assert_eq!(net.upload_count(), 0);

  engine
    .publish_due_at(&net, Slot::Am, false, jan1_10utc())
    .await
    .unwrap();
  assert_eq!(net.upload_count(), 1);
  assert_eq!(net.posts.lock().unwrap()[0].1, vec!["media-0".to_string()]);
}

#[tokio::test]
async fn verify_maps_network_identity() {
  let me = crate::verify(&FakeNetwork::default()).await.unwrap();
  assert_eq!(me.handle, "agency");
}
