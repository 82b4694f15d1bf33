//! The campaign and post store traits.
//!
//! The traits are implemented by storage backends (e.g.
//! `cadence-store-sqlite`). The engine depends on this abstraction, not on
//! any concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::{
  Classify,
  campaign::{Campaign, CampaignFilter, CampaignPatch, NewCampaign},
  post::{
    Post, PostDraft, PostPage, PostPatch, PostQuery, PublishOutcome, Slot,
    StatusCounts, UpsertOutcome,
  },
};

/// Shared error type of a backend implementing both store traits.
pub trait StoreBackend: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;
}

// ─── Campaigns ───────────────────────────────────────────────────────────────

pub trait CampaignStore: StoreBackend {
  /// Create a DRAFT, inactive campaign. Fails with `DuplicateName` if the
  /// name is taken.
  fn create_campaign(
    &self,
    input: NewCampaign,
  ) -> impl Future<Output = Result<Campaign, Self::Error>> + Send + '_;

  /// Retrieve a campaign by id. Returns `None` if not found.
  fn get_campaign(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + '_;

  fn get_campaign_by_name<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + 'a;

  fn list_campaigns<'a>(
    &'a self,
    filter: &'a CampaignFilter,
  ) -> impl Future<Output = Result<Vec<Campaign>, Self::Error>> + Send + 'a;

  /// Apply a partial update. A patch requesting activation clears the flag
  /// on every other campaign in the same atomic unit.
  fn update_campaign(
    &self,
    id: Uuid,
    patch: CampaignPatch,
  ) -> impl Future<Output = Result<Campaign, Self::Error>> + Send + '_;

  /// Make `id` the sole active campaign (status ACTIVE, flag set), clearing
  /// the flag on all others atomically.
  fn set_active(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Campaign, Self::Error>> + Send + '_;

  /// Delete a campaign and, by cascade, all of its posts.
  fn delete_campaign(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Posts ───────────────────────────────────────────────────────────────────

pub trait PostStore: StoreBackend {
  /// Insert a DRAFT post or overwrite the content and schedule of the post
  /// with the same natural key. Never touches status, `posted_at` or
  /// `external_id`. Fails with `InvalidState` when the existing row is
  /// POSTED, and with `Validation` when `day` exceeds the campaign's span.
  fn upsert_post(
    &self,
    draft: PostDraft,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  fn get_post(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;

  /// Apply a partial update, enforcing [`PostPatch::apply_to`]'s rules
  /// against the row as it is at write time.
  fn update_post(
    &self,
    id: Uuid,
    patch: PostPatch,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  /// Delete a post. POSTED posts cannot be deleted.
  fn delete_post(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The single oldest-scheduled APPROVED post of `campaign_id` in `slot`
  /// whose UTC instant is at or before `now`, that has never been posted
  /// and is not claimed by a running publish.
  fn find_due(
    &self,
    campaign_id: Uuid,
    slot: Slot,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;

  fn list_posts<'a>(
    &'a self,
    query: &'a PostQuery,
  ) -> impl Future<Output = Result<PostPage, Self::Error>> + Send + 'a;

  fn status_counts(
    &self,
    campaign_id: Uuid,
  ) -> impl Future<Output = Result<StatusCounts, Self::Error>> + Send + '_;

  /// Approve DRAFT posts of a campaign (and FAILED ones never published, if
  /// `include_failed`), optionally restricted to an inclusive day range.
  /// Returns the number of posts approved.
  fn approve_posts(
    &self,
    campaign_id: Uuid,
    days: Option<(u32, u32)>,
    include_failed: bool,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Recompute local/UTC schedules and labels of every non-POSTED post of a
  /// campaign from its current cadence. Returns the number of posts touched.
  fn reschedule_posts(
    &self,
    campaign_id: Uuid,
    offset: FixedOffset,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Publish protocol ──────────────────────────────────────────────────

  /// Claim a post for publishing. Succeeds (returns `true`) only if the post
  /// is still APPROVED, unposted and not under a live claim at write time.
  fn claim_post(
    &self,
    id: Uuid,
    token: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record the outcome of a publish, conditioned on `token` still holding
  /// the claim and the post still being APPROVED with null `posted_at`.
  /// Returns `None` when the condition no longer holds.
  fn complete_publish(
    &self,
    id: Uuid,
    token: Uuid,
    outcome: PublishOutcome,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;
}
