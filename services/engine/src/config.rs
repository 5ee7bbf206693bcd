//! Venue context and engine configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Datelike;
use revassign_id::GroupId;
use revassign_reconcile::PollPolicy;
use serde::{Deserialize, Serialize};

use crate::model::Role;

/// Naming and feature flags of the venue being matched.
///
/// Passed to every component at construction; nothing reads venue settings
/// from anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueContext {
    /// Venue group, e.g. `aclweb.org/ACL/2025`.
    pub venue_id: GroupId,
    #[serde(default = "defaults::reviewers")]
    pub reviewers_name: String,
    #[serde(default = "defaults::area_chairs")]
    pub area_chairs_name: String,
    #[serde(default = "defaults::senior_area_chairs")]
    pub senior_area_chairs_name: String,
    #[serde(default = "defaults::ethics_reviewers")]
    pub ethics_reviewers_name: String,
    #[serde(default = "defaults::enabled")]
    pub use_area_chairs: bool,
    #[serde(default)]
    pub use_senior_area_chairs: bool,
    /// Prefix of per-work-item groups: `{venue}/{submission_name}{number}`.
    #[serde(default = "defaults::submission")]
    pub submission_name: String,
    #[serde(default = "defaults::authors")]
    pub authors_name: String,
    #[serde(default = "defaults::submitted")]
    pub submitted_name: String,
    #[serde(default = "defaults::review")]
    pub review_name: String,
    #[serde(default = "defaults::meta_review")]
    pub meta_review_name: String,
    /// Venue-wide paper load ceiling before overrides.
    #[serde(default = "defaults::max_papers")]
    pub default_max_papers: u32,
}

mod defaults {
    pub fn reviewers() -> String {
        "Reviewers".to_string()
    }
    pub fn area_chairs() -> String {
        "Area_Chairs".to_string()
    }
    pub fn senior_area_chairs() -> String {
        "Senior_Area_Chairs".to_string()
    }
    pub fn ethics_reviewers() -> String {
        "Ethics_Reviewers".to_string()
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn submission() -> String {
        "Submission".to_string()
    }
    pub fn authors() -> String {
        "Authors".to_string()
    }
    pub fn submitted() -> String {
        "Submitted".to_string()
    }
    pub fn review() -> String {
        "Official_Review".to_string()
    }
    pub fn meta_review() -> String {
        "Meta_Review".to_string()
    }
    pub fn max_papers() -> u32 {
        25
    }
}

impl VenueContext {
    /// Context for `venue_id` with default naming.
    pub fn new(venue_id: GroupId) -> Self {
        Self {
            venue_id,
            reviewers_name: defaults::reviewers(),
            area_chairs_name: defaults::area_chairs(),
            senior_area_chairs_name: defaults::senior_area_chairs(),
            ethics_reviewers_name: defaults::ethics_reviewers(),
            use_area_chairs: true,
            use_senior_area_chairs: false,
            submission_name: defaults::submission(),
            authors_name: defaults::authors(),
            submitted_name: defaults::submitted(),
            review_name: defaults::review(),
            meta_review_name: defaults::meta_review(),
            default_max_papers: defaults::max_papers(),
        }
    }

    /// Group name of a role, e.g. `Area_Chairs`.
    pub fn role_name(&self, role: Role) -> &str {
        match role {
            Role::Reviewer => &self.reviewers_name,
            Role::AreaChair => &self.area_chairs_name,
            Role::SeniorAreaChair => &self.senior_area_chairs_name,
            Role::EthicsReviewer => &self.ethics_reviewers_name,
        }
    }

    /// Venue-level committee group of a role.
    pub fn committee_id(&self, role: Role) -> GroupId {
        self.venue_id.join(self.role_name(role))
    }

    /// Role whose committee group is `committee`, if any.
    pub fn role_of(&self, committee: &GroupId) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| &self.committee_id(*role) == committee)
    }

    /// Per-work-item group under this venue: `{venue}/Submission{n}`.
    pub fn work_item_group(&self, number: u32) -> GroupId {
        self.work_item_group_in(&self.venue_id, number)
    }

    /// Per-work-item group under another venue (used for prior cycles).
    pub fn work_item_group_in(&self, venue: &GroupId, number: u32) -> GroupId {
        venue.join(&format!("{}{}", self.submission_name, number))
    }

    /// Per-work-item committee group: `{venue}/Submission{n}/{role}`.
    pub fn paper_committee_id(&self, number: u32, role: Role) -> GroupId {
        self.work_item_group(number).join(self.role_name(role))
    }

    /// `{venue}/Submission{n}/{role}/Submitted`.
    pub fn paper_submitted_id(&self, number: u32, role: Role) -> GroupId {
        self.paper_committee_id(number, role).join(&self.submitted_name)
    }

    /// Author group of a work item.
    pub fn authors_id(&self, number: u32) -> GroupId {
        self.work_item_group(number).join(&self.authors_name)
    }

    /// Review stage whose notes block an overwrite deploy for `role`.
    pub fn review_stage(&self, role: Role) -> &str {
        match role {
            Role::Reviewer | Role::EthicsReviewer => &self.review_name,
            Role::AreaChair | Role::SeniorAreaChair => &self.meta_review_name,
        }
    }

    /// Emergency invitee group used when re-invitation is enabled.
    pub fn emergency_group(&self, role: Role) -> GroupId {
        self.venue_id
            .join(&format!("Emergency_{}", self.role_name(role)))
    }

    /// Whether a committee for `role` exists at this venue.
    pub fn has_role(&self, role: Role) -> bool {
        match role {
            Role::AreaChair => self.use_area_chairs,
            Role::SeniorAreaChair => self.use_senior_area_chairs,
            Role::Reviewer | Role::EthicsReviewer => true,
        }
    }
}

/// Publication thresholds for the seniority tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeniorityConfig {
    /// Minimum number of recent main-venue publications.
    pub min_publications: usize,
    /// Number of years (including the current one) counted as recent.
    pub window_years: i32,
}

impl Default for SeniorityConfig {
    fn default() -> Self {
        Self {
            min_publications: 5,
            window_years: 5,
        }
    }
}

/// Scoring service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            model: "specter+mfr".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub score_poll: PollPolicy,
    pub deletion_poll: PollPolicy,
    /// Relations per bulk insert call.
    pub batch_size: usize,
    /// Concurrent bulk insert calls.
    pub bulk_concurrency: usize,
    /// Work items deployed concurrently.
    pub deploy_concurrency: usize,
    /// Affinity weight forced on retained prior-cycle candidates.
    pub retained_score: f64,
    pub seniority: SeniorityConfig,
    pub scoring: ScoringConfig,
    /// Year used for recency cut-offs; defaults to the current year.
    pub reference_year: Option<i32>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            score_poll: PollPolicy::scoring(),
            deletion_poll: PollPolicy::deletion(),
            batch_size: 50_000,
            bulk_concurrency: 4,
            deploy_concurrency: 8,
            retained_score: 3.0,
            seniority: SeniorityConfig::default(),
            scoring: ScoringConfig::default(),
            reference_year: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `REVASSIGN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let score_poll = defaults
            .score_poll
            .with_interval(Duration::from_secs(env_parse(
                "REVASSIGN_SCORE_POLL_INTERVAL_SECS",
                defaults.score_poll.interval.as_secs(),
            )?))
            .with_max_attempts(env_parse(
                "REVASSIGN_SCORE_POLL_ATTEMPTS",
                defaults.score_poll.max_attempts,
            )?);

        let deletion_poll = defaults
            .deletion_poll
            .with_interval(Duration::from_secs(env_parse(
                "REVASSIGN_DELETE_POLL_INTERVAL_SECS",
                defaults.deletion_poll.interval.as_secs(),
            )?))
            .with_max_attempts(env_parse(
                "REVASSIGN_DELETE_POLL_ATTEMPTS",
                defaults.deletion_poll.max_attempts,
            )?);

        let seniority = SeniorityConfig {
            min_publications: env_parse(
                "REVASSIGN_SENIORITY_MIN_PUBLICATIONS",
                defaults.seniority.min_publications,
            )?,
            window_years: env_parse(
                "REVASSIGN_SENIORITY_WINDOW_YEARS",
                defaults.seniority.window_years,
            )?,
        };

        let scoring = ScoringConfig {
            base_url: std::env::var("REVASSIGN_SCORING_URL")
                .unwrap_or(defaults.scoring.base_url),
            model: std::env::var("REVASSIGN_SCORING_MODEL").unwrap_or(defaults.scoring.model),
            request_timeout: Duration::from_secs(env_parse(
                "REVASSIGN_SCORING_TIMEOUT_SECS",
                defaults.scoring.request_timeout.as_secs(),
            )?),
        };

        let reference_year = match std::env::var("REVASSIGN_REFERENCE_YEAR") {
            Ok(v) => Some(
                v.parse()
                    .with_context(|| format!("invalid REVASSIGN_REFERENCE_YEAR: {v}"))?,
            ),
            Err(_) => None,
        };

        let log_level =
            std::env::var("REVASSIGN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = std::env::var("REVASSIGN_LOG_JSON")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            score_poll,
            deletion_poll,
            batch_size: env_parse("REVASSIGN_BULK_BATCH_SIZE", defaults.batch_size)?.max(1),
            bulk_concurrency: env_parse("REVASSIGN_BULK_CONCURRENCY", defaults.bulk_concurrency)?
                .max(1),
            deploy_concurrency: env_parse(
                "REVASSIGN_DEPLOY_CONCURRENCY",
                defaults.deploy_concurrency,
            )?
            .max(1),
            retained_score: env_parse("REVASSIGN_RETAINED_SCORE", defaults.retained_score)?,
            seniority,
            scoring,
            reference_year,
            log_level,
            log_json,
        })
    }

    /// Year used for recency cut-offs.
    pub fn current_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("invalid value for {key}: {v}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> VenueContext {
        let mut ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
        ctx.use_senior_area_chairs = true;
        ctx
    }

    #[test]
    fn test_group_naming() {
        let ctx = ctx();
        assert_eq!(ctx.committee_id(Role::AreaChair).as_str(), "ACL/2025/Area_Chairs");
        assert_eq!(
            ctx.paper_committee_id(7, Role::Reviewer).as_str(),
            "ACL/2025/Submission7/Reviewers"
        );
        assert_eq!(
            ctx.paper_submitted_id(7, Role::Reviewer).as_str(),
            "ACL/2025/Submission7/Reviewers/Submitted"
        );
        assert_eq!(ctx.authors_id(7).as_str(), "ACL/2025/Submission7/Authors");
        assert_eq!(
            ctx.emergency_group(Role::Reviewer).as_str(),
            "ACL/2025/Emergency_Reviewers"
        );
    }

    #[test]
    fn test_role_lookup() {
        let ctx = ctx();
        let sacs = GroupId::parse("ACL/2025/Senior_Area_Chairs").unwrap();
        assert_eq!(ctx.role_of(&sacs), Some(Role::SeniorAreaChair));
        assert_eq!(ctx.role_of(&GroupId::parse("ACL/2025/Authors").unwrap()), None);
        assert_eq!(ctx.review_stage(Role::AreaChair), "Meta_Review");
    }

    #[test]
    fn test_venue_context_fills_missing_fields() {
        let ctx: VenueContext =
            serde_json::from_str(r#"{"venue_id": "ICML/2026", "use_area_chairs": false}"#).unwrap();
        assert_eq!(ctx.venue_id.as_str(), "ICML/2026");
        assert!(!ctx.use_area_chairs);
        assert_eq!(ctx.reviewers_name, "Reviewers");
        assert_eq!(ctx, {
            let mut expected = VenueContext::new(ctx.venue_id.clone());
            expected.use_area_chairs = false;
            expected
        });
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.score_poll.interval, Duration::from_secs(60));
        assert_eq!(config.score_poll.max_attempts, 1440);
        assert_eq!(config.deletion_poll.max_attempts, 40);
        assert_eq!(config.batch_size, 50_000);
        assert_eq!(config.retained_score, 3.0);
        let pinned = EngineConfig {
            reference_year: Some(2024),
            ..Default::default()
        };
        assert_eq!(pinned.current_year(), 2024);
    }
}
