//! Command-line surface.

use std::path::PathBuf;

use cadence_core::{
  campaign::CampaignStatus,
  post::{PostStatus, Slot},
  schedule::parse_time_of_day,
};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Social campaign scheduler and publisher")]
pub struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "cadence.toml")]
  pub config: PathBuf,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Manage campaigns.
  #[command(subcommand)]
  Campaign(CampaignCommand),

  /// Inspect and edit posts.
  #[command(subcommand)]
  Post(PostCommand),

  /// Import a content feed into a campaign.
  Import(ImportArgs),

  /// Publish the post due now in a slot of the active campaign.
  Publish {
    #[arg(long)]
    slot:    Slot,
    /// Report what would be sent without claiming or posting.
    #[arg(long)]
    dry_run: bool,
  },

  /// Per-status post counts of a campaign.
  Stats {
    /// Campaign id or name.
    #[arg(long)]
    campaign: String,
  },

  /// Check the network credentials and print the account handle.
  Verify,
}

// ─── Campaigns ────────────────────────────────────────────────────────────────

/// Schedule options shared by `campaign create`, `campaign update` and
/// `import`.
#[derive(Args, Debug, Default)]
pub struct ScheduleArgs {
  #[arg(long, value_name = "YYYY-MM-DD")]
  pub start_date: Option<NaiveDate>,
  #[arg(long)]
  pub total_days: Option<u32>,
  /// Local time of the morning slot.
  #[arg(long, value_name = "HH:MM", value_parser = time_of_day)]
  pub am_time:    Option<NaiveTime>,
  /// Local time of the evening slot.
  #[arg(long, value_name = "HH:MM", value_parser = time_of_day)]
  pub pm_time:    Option<NaiveTime>,
}

#[derive(Subcommand, Debug)]
pub enum CampaignCommand {
  Create {
    name:           String,
    #[arg(long)]
    description:    Option<String>,
    #[arg(long, value_name = "URL")]
    fallback_image: Option<String>,
    #[command(flatten)]
    schedule:       ScheduleArgs,
  },

  List {
    #[arg(long)]
    status: Option<CampaignStatus>,
    /// Only the campaign flagged active.
    #[arg(long)]
    active: bool,
    /// Substring of the name.
    #[arg(long)]
    name:   Option<String>,
  },

  Show {
    /// Campaign id or name.
    campaign: String,
  },

  Update {
    /// Campaign id or name.
    campaign:             String,
    #[arg(long)]
    name:                 Option<String>,
    #[arg(long, conflicts_with = "clear_description")]
    description:          Option<String>,
    #[arg(long)]
    clear_description:    bool,
    #[arg(long, value_name = "URL", conflicts_with = "clear_fallback_image")]
    fallback_image:       Option<String>,
    #[arg(long)]
    clear_fallback_image: bool,
    #[arg(long)]
    status:               Option<CampaignStatus>,
    #[command(flatten)]
    schedule:             ScheduleArgs,
  },

  /// Make a campaign the sole active one.
  Activate {
    campaign: String,
  },

  /// Delete a campaign and all of its posts.
  Delete {
    campaign: String,
  },
}

// ─── Posts ────────────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum PostCommand {
  List {
    /// Campaign id or name.
    #[arg(long)]
    campaign: Option<String>,
    #[arg(long)]
    status:   Option<PostStatus>,
    #[arg(long)]
    day:      Option<u32>,
    #[arg(long)]
    slot:     Option<Slot>,
    #[arg(long)]
    cycle:    Option<u32>,
    /// Free text matched against body and audience.
    #[arg(long)]
    search:   Option<String>,
    #[arg(long)]
    page:     Option<u32>,
    #[arg(long)]
    limit:    Option<u32>,
  },

  Show {
    id: Uuid,
  },

  Update {
    id:          Uuid,
    #[arg(long)]
    body:        Option<String>,
    #[arg(long)]
    audience:    Option<String>,
    /// Media URL; repeat for several. Replaces the current list.
    #[arg(long = "media", value_name = "URL", conflicts_with = "clear_media")]
    media:       Vec<String>,
    #[arg(long)]
    clear_media: bool,
    #[arg(long, conflicts_with = "clear_alt")]
    alt:         Option<String>,
    #[arg(long)]
    clear_alt:   bool,
    /// Whether a fallback image is attached when the post has no media.
    #[arg(long)]
    og_fallback: Option<bool>,
    #[arg(long)]
    status:      Option<PostStatus>,
  },

  /// Approve one post for publishing.
  Approve {
    id: Uuid,
  },

  /// Approve every draft post of a campaign.
  ApproveAll {
    /// Campaign id or name.
    #[arg(long)]
    campaign:       String,
    #[arg(long, requires = "to_day")]
    from_day:       Option<u32>,
    #[arg(long, requires = "from_day")]
    to_day:         Option<u32>,
    /// Also re-approve failed posts that never reached the network.
    #[arg(long)]
    include_failed: bool,
  },

  Delete {
    id: Uuid,
  },
}

// ─── Import ───────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ImportArgs {
  /// Target campaign; created when it does not exist.
  #[arg(long)]
  pub campaign: String,

  #[command(flatten)]
  pub source: SourceArgs,

  #[command(flatten)]
  pub schedule: ScheduleArgs,

  #[arg(long)]
  pub description: Option<String>,

  #[arg(long, value_name = "URL")]
  pub fallback_image: Option<String>,

  #[arg(long, default_value_t = cadence_core::post::DEFAULT_CYCLE)]
  pub cycle: u32,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
  /// Allow-listed file name under the configured feed directory.
  #[arg(long, value_name = "FILE")]
  pub local:  Option<String>,
  /// HTTPS URL of the feed.
  #[arg(long, value_name = "URL")]
  pub remote: Option<String>,
}

fn time_of_day(s: &str) -> Result<NaiveTime, String> {
  parse_time_of_day(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn command_tree_is_consistent() { Cli::command().debug_assert(); }

  #[test]
  fn import_requires_exactly_one_source() {
    let ok = Cli::try_parse_from(["cadence", "import", "--campaign", "Q1", "--local", "q1.json"]);
    assert!(ok.is_ok());

    let none = Cli::try_parse_from(["cadence", "import", "--campaign", "Q1"]);
    assert!(none.is_err());

    let both = Cli::try_parse_from([
      "cadence", "import", "--campaign", "Q1", "--local", "a.json", "--remote", "https://x/y",
    ]);
    assert!(both.is_err());
  }

  #[test]
  fn publish_parses_slot_case_insensitively() {
    let cli = Cli::try_parse_from(["cadence", "publish", "--slot", "PM", "--dry-run"]).unwrap();
    assert!(matches!(cli.command, Command::Publish { slot: Slot::Pm, dry_run: true }));
  }

  #[test]
  fn slot_times_are_validated() {
    let bad = Cli::try_parse_from(["cadence", "campaign", "create", "Q1", "--am-time", "25:00"]);
    assert!(bad.is_err());
  }
}
