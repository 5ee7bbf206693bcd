//! Relations command - list active relations of one kind.

use anyhow::Result;
use clap::{Args, ValueEnum};
use revassign_engine::model::Role;
use revassign_relations::{Relation, RelationKind, RelationScope};
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::{CommandContext, Committee};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Conflict,
    AffinityScore,
    CustomCapacity,
    ProposedAssignment,
    Assignment,
    InviteAssignment,
    Status,
    Track,
    Seniority,
}

impl From<Kind> for RelationKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Conflict => RelationKind::Conflict,
            Kind::AffinityScore => RelationKind::AffinityScore,
            Kind::CustomCapacity => RelationKind::CustomCapacity,
            Kind::ProposedAssignment => RelationKind::ProposedAssignment,
            Kind::Assignment => RelationKind::Assignment,
            Kind::InviteAssignment => RelationKind::InviteAssignment,
            Kind::Status => RelationKind::Status,
            Kind::Track => RelationKind::Track,
            Kind::Seniority => RelationKind::Seniority,
        }
    }
}

/// Relations command.
#[derive(Debug, Args)]
pub struct RelationsCommand {
    #[arg(long, value_enum)]
    committee: Committee,

    #[arg(long, value_enum)]
    kind: Kind,

    /// Only relations with this label.
    #[arg(long)]
    label: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct RelationRow {
    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Head")]
    head: String,

    #[tabled(rename = "Tail")]
    tail: String,

    #[tabled(rename = "Weight", display = "display_weight")]
    weight: Option<f64>,

    #[tabled(rename = "Label", display = "display_option")]
    label: Option<String>,

    #[tabled(rename = "Version")]
    version: String,
}

fn display_weight(weight: &Option<f64>) -> String {
    weight.map_or_else(|| "-".to_string(), |w| w.to_string())
}

fn display_option(opt: &Option<String>) -> String {
    opt.clone().unwrap_or_else(|| "-".to_string())
}

impl From<Relation> for RelationRow {
    fn from(relation: Relation) -> Self {
        Self {
            id: relation.id.to_string(),
            head: relation.head.to_string(),
            tail: relation.tail.into_inner(),
            weight: relation.weight,
            label: relation.label,
            version: relation.version.to_string(),
        }
    }
}

impl RelationsCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let committee = ctx.venue.committee_id(Role::from(self.committee));
        let mut scope = RelationScope::new(committee, RelationKind::from(self.kind));
        if let Some(label) = self.label {
            scope = scope.with_label(label);
        }

        let mut rows: Vec<RelationRow> = ctx
            .engine()
            .relations(&scope)
            .await?
            .into_iter()
            .map(RelationRow::from)
            .collect();
        rows.sort_by(|a, b| a.head.cmp(&b.head).then_with(|| a.tail.cmp(&b.tail)));
        print_output(&rows, ctx.format);
        Ok(())
    }
}
