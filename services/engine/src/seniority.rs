//! Seniority tags.

use revassign_relations::{RelationKind, RelationScope};
use tracing::{info, instrument};

use crate::config::{SeniorityConfig, VenueContext};
use crate::error::EngineResult;
use crate::model::{Profile, Role};
use crate::permissions::PermissionScope;
use crate::replace::BulkReplacer;

/// Label of a Seniority relation.
pub const SENIOR_LABEL: &str = "Senior";

/// Flagged senior, or enough recent main-venue publications.
///
/// The window counts `window_years` years ending with `current_year`.
pub fn is_senior(profile: &Profile, config: &SeniorityConfig, current_year: i32) -> bool {
    if profile.senior {
        return true;
    }
    let since = current_year - config.window_years;
    let recent = profile
        .publications
        .iter()
        .filter(|p| p.main_venue && p.year.is_some_and(|y| y > since))
        .count();
    recent >= config.min_publications
}

/// Maintains Seniority relations for one committee.
#[derive(Debug, Clone)]
pub struct SenioritySync {
    ctx: VenueContext,
    permissions: PermissionScope,
    config: SeniorityConfig,
    current_year: i32,
}

impl SenioritySync {
    pub fn new(ctx: &VenueContext, role: Role, config: SeniorityConfig, current_year: i32) -> Self {
        Self {
            ctx: ctx.clone(),
            permissions: PermissionScope::for_role(ctx, role),
            config,
            current_year,
        }
    }

    /// Replaces the committee's Seniority set from `profiles`.
    #[instrument(skip(self, replacer, profiles), fields(committee = %self.permissions.committee(), profiles = profiles.len()))]
    pub async fn sync_seniority(&self, replacer: &BulkReplacer, profiles: &[Profile]) -> EngineResult<usize> {
        let committee = self.permissions.committee().clone();
        let relations = profiles
            .iter()
            .filter(|p| is_senior(p, &self.config, self.current_year))
            .map(|p| {
                self.permissions
                    .builder(&self.ctx, RelationKind::Seniority, committee.clone(), &p.id, None)
                    .weight(1.0)
                    .label(SENIOR_LABEL)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let seniors = relations.len();
        replacer
            .replace(&RelationScope::new(committee, RelationKind::Seniority), relations)
            .await?;
        info!(seniors, "synced seniority");
        Ok(seniors)
    }
}
