//! Due-item selection. Read-only.

use cadence_core::{
  campaign::{Campaign, CampaignFilter},
  post::{Post, Slot},
  store::{CampaignStore, PostStore},
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// The single live campaign: status ACTIVE with the active flag set. None,
/// or more than one, is `NoActiveCampaign`.
pub async fn active_campaign<S: CampaignStore>(store: &S) -> Result<Campaign> {
  let filter = CampaignFilter { is_active: Some(true), ..Default::default() };
  let mut live: Vec<Campaign> = store
    .list_campaigns(&filter)
    .await
    .map_err(Error::store)?
    .into_iter()
    .filter(Campaign::is_live)
    .collect();

  match live.len() {
    1 => Ok(live.remove(0)),
    n => {
      if n > 1 {
        tracing::warn!(count = n, "more than one live campaign");
      }
      Err(cadence_core::Error::NoActiveCampaign.into())
    }
  }
}

/// The post to publish now in `slot`, with its campaign.
pub async fn select_due<S>(store: &S, slot: Slot, now: DateTime<Utc>) -> Result<(Campaign, Post)>
where
  S: CampaignStore + PostStore,
{
  let campaign = active_campaign(store).await?;
  let post = store
    .find_due(campaign.campaign_id, slot, now)
    .await
    .map_err(Error::store)?
    .ok_or(cadence_core::Error::NoDuePost(slot))?;

  tracing::debug!(
    campaign = %campaign.name,
    post_id = %post.post_id,
    day = post.day,
    scheduled_utc = %post.scheduled_utc,
    "selected due post"
  );
  Ok((campaign, post))
}
