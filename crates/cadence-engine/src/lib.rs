//! Orchestration for the Cadence campaign scheduler.
//!
//! [`Engine`] ties a store backend to the feed fetcher, media resolver and
//! the reference UTC offset, and exposes the operations a trigger calls:
//! import a feed, publish the due post, and campaign updates that keep post
//! schedules in step with the campaign cadence.

pub mod config;
pub mod error;
pub mod fetch;
pub mod import;
pub mod media;
pub mod publish;
pub mod select;
pub mod source;
pub mod x;

#[cfg(test)]
mod tests;

use std::time::Duration;

use cadence_core::{
  campaign::{Campaign, CampaignPatch},
  network::{Identity, SocialNetwork},
  post::Slot,
  store::{CampaignStore, PostStore},
};
use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

pub use config::EngineConfig;
pub use error::{Error, Result};
use import::{ImportReport, ImportRequest};
use media::MediaResolver;
use publish::{Payload, PublishReport, Publisher};
use source::FeedFetcher;

pub struct Engine<S> {
  store:            S,
  fetcher:          FeedFetcher,
  media:            MediaResolver,
  offset:           FixedOffset,
  /// Bound on one publish after its post is claimed.
  publish_deadline: Duration,
}

impl<S> Engine<S>
where
  S: CampaignStore + PostStore,
{
  /// Build an engine. Fails when the configured timeouts could outlast a
  /// publish claim.
  pub fn new(store: S, config: &EngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      store,
      fetcher: FeedFetcher::new(config.feed.clone())?,
      media: MediaResolver::new(config.media.clone())?,
      offset: config.schedule.offset()?,
      publish_deadline: config.publish_deadline(),
    })
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn offset(&self) -> FixedOffset { self.offset }

  /// Load a feed from its source and import it.
  pub async fn import_feed(&self, request: &ImportRequest) -> Result<ImportReport> {
    let document = self.fetcher.load(&request.source).await?;
    import::import_document(&self.store, self.offset, request, &document).await
  }

  /// Publish the post due in `slot` right now.
  pub async fn publish_due<N: SocialNetwork>(
    &self,
    network: &N,
    slot: Slot,
    dry_run: bool,
  ) -> Result<PublishReport> {
    self.publish_due_at(network, slot, dry_run, Utc::now()).await
  }

  pub async fn publish_due_at<N: SocialNetwork>(
    &self,
    network: &N,
    slot: Slot,
    dry_run: bool,
    now: DateTime<Utc>,
  ) -> Result<PublishReport> {
    Publisher::new(&self.store, network, &self.media, self.publish_deadline)
      .publish_due(slot, dry_run, now)
      .await
  }

  /// What [`Engine::publish_due`] would send in `slot` right now. Needs no
  /// network client, so it works without credentials.
  pub async fn preview_due(&self, slot: Slot) -> Result<Payload> {
    self.preview_due_at(slot, Utc::now()).await
  }

  pub async fn preview_due_at(&self, slot: Slot, now: DateTime<Utc>) -> Result<Payload> {
    publish::preview_due(&self.store, &self.media, slot, now).await
  }

  /// Update a campaign, recomputing post schedules when its cadence moved.
  pub async fn update_campaign(&self, id: Uuid, patch: CampaignPatch) -> Result<Campaign> {
    let before = self
      .store
      .get_campaign(id)
      .await
      .map_err(Error::store)?
      .ok_or(cadence_core::Error::CampaignNotFound(id))?;
    let after = self
      .store
      .update_campaign(id, patch)
      .await
      .map_err(Error::store)?;

    let moved = before.schedule.start_date != after.schedule.start_date
      || before.schedule.am_time != after.schedule.am_time
      || before.schedule.pm_time != after.schedule.pm_time;
    if moved {
      self
        .store
        .reschedule_posts(id, self.offset)
        .await
        .map_err(Error::store)?;
    }
    Ok(after)
  }

  /// The live campaign, if exactly one exists.
  pub async fn active_campaign(&self) -> Result<Campaign> {
    select::active_campaign(&self.store).await
  }
}

/// Confirm network credentials.
pub async fn verify<N: SocialNetwork>(network: &N) -> Result<Identity> {
  network.verify().await.map_err(Error::network)
}
