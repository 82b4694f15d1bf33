//! The publisher: select, claim, resolve media, post, record.
//!
//! A run is at most once per post. The claim is a conditional write that
//! only one invocation can win, and the final POSTED/FAILED write is
//! conditioned on still holding it.

use std::time::Duration;

use cadence_core::{
  campaign::Campaign,
  network::{MediaUpload, SocialNetwork},
  post::{Post, PublishOutcome, Slot},
  store::{CampaignStore, PostStore},
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, Result, media::MediaResolver, select::select_due};

/// What a dry run would have sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
  pub post_id:        Uuid,
  pub text:           String,
  pub media_urls:     Vec<String>,
  pub fallback_image: Option<String>,
  pub scheduled_utc:  DateTime<Utc>,
  pub label:          String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishReport {
  DryRun { payload: Payload },
  Posted {
    post_id:        Uuid,
    external_id:    String,
    /// Media ids attached to the post.
    media_ids:      Vec<String>,
    /// Media URLs that could not be uploaded and were dropped.
    media_dropped:  Vec<String>,
  },
}

/// What a publish in `slot` at `now` would send. Claims nothing, uploads
/// nothing and needs no network client.
pub async fn preview_due<S>(
  store: &S,
  media: &MediaResolver,
  slot: Slot,
  now: DateTime<Utc>,
) -> Result<Payload>
where
  S: CampaignStore + PostStore,
{
  let (campaign, post) = select_due(store, slot, now).await?;
  let payload = payload(media, &campaign, &post).await;
  tracing::info!(post_id = %post.post_id, "dry run; nothing sent");
  Ok(payload)
}

async fn payload(media: &MediaResolver, campaign: &Campaign, post: &Post) -> Payload {
  let fallback_image = if post.content.media_urls.is_empty() && post.content.use_og_fallback {
    media.fallback_image(campaign).await
  } else {
    None
  };
  Payload {
    post_id: post.post_id,
    text: post.content.body.clone(),
    media_urls: post.content.media_urls.clone(),
    fallback_image,
    scheduled_utc: post.scheduled_utc,
    label: post.time_label.clone(),
  }
}

pub struct Publisher<'a, S, N> {
  store:    &'a S,
  network:  &'a N,
  media:    &'a MediaResolver,
  /// Bound on everything between the claim and the outcome write. Kept
  /// under the claim lease so no other run can take the post over while
  /// this one may still be talking to the network.
  deadline: Duration,
}

/// A post accepted by the network.
struct Sent {
  external_id:   String,
  media_ids:     Vec<String>,
  media_dropped: Vec<String>,
}

impl<'a, S, N> Publisher<'a, S, N>
where
  S: CampaignStore + PostStore,
  N: SocialNetwork,
{
  pub fn new(store: &'a S, network: &'a N, media: &'a MediaResolver, deadline: Duration) -> Self {
    Self { store, network, media, deadline }
  }

  /// Publish the post due in `slot` at `now`.
  ///
  /// A failed or timed-out network call is recorded on the post and
  /// returned as `PublishFailed`.
  pub async fn publish_due(
    &self,
    slot: Slot,
    dry_run: bool,
    now: DateTime<Utc>,
  ) -> Result<PublishReport> {
    if dry_run {
      let payload = preview_due(self.store, self.media, slot, now).await?;
      return Ok(PublishReport::DryRun { payload });
    }

    let (campaign, post) = select_due(self.store, slot, now).await?;

    let token = Uuid::new_v4();
    let claimed = self
      .store
      .claim_post(post.post_id, token, now)
      .await
      .map_err(Error::store)?;
    if !claimed {
      tracing::info!(post_id = %post.post_id, "post claimed by another run");
      return Err(cadence_core::Error::NoDuePost(slot).into());
    }

    let error = match tokio::time::timeout(self.deadline, self.send(&campaign, &post)).await {
      Ok(Ok(sent)) => {
        let outcome = PublishOutcome::Posted { external_id: sent.external_id.clone() };
        self.complete(&post, token, outcome, now).await?;
        tracing::info!(
          post_id = %post.post_id,
          external_id = %sent.external_id,
          media = sent.media_ids.len(),
          "post published"
        );
        return Ok(PublishReport::Posted {
          post_id:       post.post_id,
          external_id:   sent.external_id,
          media_ids:     sent.media_ids,
          media_dropped: sent.media_dropped,
        });
      }
      Ok(Err(e)) => e.to_string(),
      Err(_) => format!(
        "no outcome within {}s; the post may have gone out, check the account before re-approving",
        self.deadline.as_secs_f32()
      ),
    };

    let outcome = PublishOutcome::Failed { error: error.clone() };
    self.complete(&post, token, outcome, now).await?;
    tracing::error!(post_id = %post.post_id, error = %error, "publish failed");
    Err(cadence_core::Error::PublishFailed(format!("post {}: {error}", post.post_id)).into())
  }

  /// Resolve and upload media, then post the text.
  async fn send(&self, campaign: &Campaign, post: &Post) -> std::result::Result<Sent, N::Error> {
    let urls = self.media_urls(campaign, post).await;
    let (media_ids, media_dropped) = self.upload_all(&urls, post.content.media_alt.as_deref()).await;
    if !urls.is_empty() && media_ids.is_empty() {
      tracing::warn!(post_id = %post.post_id, "no media could be uploaded; posting text only");
    }

    let external_id = self.network.post_text(&post.content.body, &media_ids).await?;
    Ok(Sent { external_id, media_ids, media_dropped })
  }

  async fn complete(
    &self,
    post: &Post,
    token: Uuid,
    outcome: PublishOutcome,
    at: DateTime<Utc>,
  ) -> Result<Post> {
    self
      .store
      .complete_publish(post.post_id, token, outcome, at)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        cadence_core::Error::invalid_state(format!(
          "claim on post {} lapsed before its outcome was recorded",
          post.post_id
        ))
        .into()
      })
  }

  /// Explicit media, else one fallback image when the post allows it.
  async fn media_urls(&self, campaign: &Campaign, post: &Post) -> Vec<String> {
    if !post.content.media_urls.is_empty() {
      return post.content.media_urls.clone();
    }
    if post.content.use_og_fallback {
      return self.media.fallback_image(campaign).await.into_iter().collect();
    }
    Vec::new()
  }

  /// Download and upload every URL concurrently. Failures are logged and
  /// dropped; returns `(uploaded ids, dropped urls)` in input order.
  async fn upload_all(&self, urls: &[String], alt_text: Option<&str>) -> (Vec<String>, Vec<String>) {
    let attempts = urls.iter().map(|url| async move {
      let result = self.upload_one(url, alt_text).await;
      (url, result)
    });

    join_all(attempts)
      .await
      .into_iter()
      .fold((Vec::new(), Vec::new()), |(mut ids, mut dropped), (url, result)| {
        match result {
          Ok(id) => ids.push(id),
          Err(e) => {
            tracing::warn!(%url, error = %e, "media upload failed; dropping it");
            dropped.push(url.clone());
          }
        }
        (ids, dropped)
      })
  }

  async fn upload_one(&self, url: &str, alt_text: Option<&str>) -> Result<String> {
    let file = self.media.download(url).await?;
    let upload = MediaUpload {
      data:       file.data,
      media_type: file.media_type,
      alt_text:   alt_text.map(str::to_owned),
    };
    self
      .network
      .upload_media(upload)
      .await
      .map_err(|e| cadence_core::Error::UploadFailed(format!("{url}: {e}")).into())
  }
}
