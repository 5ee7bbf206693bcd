//! Domain records read from the venue's stores.

use revassign_id::{CandidateId, GroupId, WorkItemId};
use serde::{Deserialize, Serialize};

/// Committee role of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reviewer,
    AreaChair,
    SeniorAreaChair,
    EthicsReviewer,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Reviewer,
        Role::AreaChair,
        Role::SeniorAreaChair,
        Role::EthicsReviewer,
    ];

    /// Prefix of the pseudonymous per-work-item groups of this role,
    /// e.g. `Reviewer_` in `Venue/Submission3/Reviewer_abcd`.
    pub fn anonymous_prefix(&self) -> &'static str {
        match self {
            Role::Reviewer => "Reviewer_",
            Role::AreaChair => "Area_Chair_",
            Role::SeniorAreaChair => "Senior_Area_Chair_",
            Role::EthicsReviewer => "Ethics_Reviewer_",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Reviewer => "reviewer",
            Role::AreaChair => "area_chair",
            Role::SeniorAreaChair => "senior_area_chair",
            Role::EthicsReviewer => "ethics_reviewer",
        };
        f.write_str(name)
    }
}

/// A name entry on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileName {
    pub fullname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// One employment or education entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Institution domain, e.g. `cs.umass.edu`.
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i32>,
}

/// A declared relation to another person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRelation {
    /// Email (or profile id) of the related person.
    pub email: String,
    /// Relation kind as entered, e.g. `Coauthor`, `Advisor`.
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i32>,
}

impl ProfileRelation {
    /// Co-author and co-worker relations expire; others never do.
    pub fn is_time_bounded(&self) -> bool {
        matches!(self.relation.as_str(), "Coauthor" | "Coworker")
    }
}

/// A publication on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Year the publication record was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i32>,
    /// Published at one of the venue family's main venues.
    #[serde(default)]
    pub main_venue: bool,
}

impl Publication {
    /// The stated year, unless missing or later than `current_year`, in
    /// which case the record's creation year.
    pub fn effective_year(&self, current_year: i32) -> Option<i32> {
        self.year
            .filter(|year| *year <= current_year)
            .or(self.created)
    }
}

/// A candidate or author profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: CandidateId,
    #[serde(default)]
    pub names: Vec<ProfileName>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub confirmed_emails: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub relations: Vec<ProfileRelation>,
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default)]
    pub senior: bool,
}

impl Profile {
    /// Creates an empty profile.
    pub fn new(id: CandidateId) -> Self {
        Self {
            id,
            names: Vec::new(),
            emails: Vec::new(),
            confirmed_emails: Vec::new(),
            history: Vec::new(),
            relations: Vec::new(),
            publications: Vec::new(),
            senior: false,
        }
    }

    /// Identities a registration form may be signed with: confirmed emails
    /// followed by usernames.
    pub fn signatures(&self) -> impl Iterator<Item = &str> {
        self.confirmed_emails.iter().map(String::as_str).chain(
            self.names
                .iter()
                .filter_map(|n| n.username.as_deref())
                .filter(|u| !u.is_empty()),
        )
    }
}

/// Author's choice about the prior cycle's committee for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassignmentChoice {
    /// Assign different people this cycle.
    WantsNew,
    /// Keep the prior cycle's people.
    #[default]
    Retain,
    /// The work item is not a resubmission.
    NotApplicable,
}

impl ReassignmentChoice {
    /// Interpret a free-text form answer.
    pub fn from_answer(answer: &str) -> Self {
        let answer = answer.trim();
        if answer.contains("is not a") {
            Self::NotApplicable
        } else if answer.starts_with("Yes") {
            Self::WantsNew
        } else {
            Self::Retain
        }
    }
}

/// The two independent reassignment answers of a resubmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReassignmentRequest {
    #[serde(default)]
    pub reviewers: ReassignmentChoice,
    #[serde(default)]
    pub area_chair: ReassignmentChoice,
}

/// Link from a resubmission to its prior-cycle work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorSubmission {
    /// Venue of the prior cycle, e.g. `ACL/2024/October`.
    pub venue: GroupId,
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_item: Option<WorkItemId>,
}

/// A submission under review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub number: u32,
    #[serde(default)]
    pub authors: Vec<CandidateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<PriorSubmission>,
    #[serde(default)]
    pub reassignment: ReassignmentRequest,
}

/// A candidate's availability answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResponse {
    /// Email or username the response was signed with.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_load: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_load_this_cycle: Option<u32>,
    /// Willing to review resubmissions even with no regular load.
    #[serde(default)]
    pub resubmissions_only: bool,
}

impl LoadResponse {
    /// Requested ceiling: the cycle maximum when given, else the reduced load.
    pub fn requested(&self) -> Option<u32> {
        self.max_load_this_cycle.or(self.reduced_load)
    }
}

/// Research areas a candidate registered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRegistration {
    pub signature: String,
    pub tracks: Vec<String>,
}
