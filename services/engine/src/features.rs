//! Conflict feature extraction.
//!
//! A profile reduces to four sets: institutional domains, own emails,
//! related people's emails, and publication ids. Relations and emails are
//! kept apart because the detector cross-pairs them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::Profile;

/// Public email providers never treated as an institution.
pub const COMMON_DOMAINS: [&str; 13] = [
    "gmail.com",
    "qq.com",
    "126.com",
    "163.com",
    "outlook.com",
    "hotmail.com",
    "yahoo.com",
    "foxmail.com",
    "aol.com",
    "msn.com",
    "ymail.com",
    "googlemail.com",
    "live.com",
];

/// Prefix of a redacted email address.
const OBFUSCATED_PREFIX: &str = "****@";

/// How much of a profile's past counts toward conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Everything on the profile counts.
    #[default]
    Default,
    /// Only the last `years` years of history, co-authorship and publications.
    NeurIps { years: i32 },
}

impl ConflictPolicy {
    /// NeurIPS policy with the usual three-year window.
    pub const fn neurips() -> Self {
        Self::NeurIps { years: 3 }
    }

    /// Entries ending in or before this year are ignored.
    fn cutoff(&self, current_year: i32) -> Option<i32> {
        match self {
            Self::Default => None,
            Self::NeurIps { years } => Some(current_year - years - 1),
        }
    }
}

/// Conflict features of one profile or one work item's authors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictFeatures {
    pub domains: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    pub relations: BTreeSet<String>,
    pub publications: BTreeSet<String>,
}

impl ConflictFeatures {
    /// Adds every feature of `other`.
    pub fn merge(&mut self, other: &ConflictFeatures) {
        self.domains.extend(other.domains.iter().cloned());
        self.emails.extend(other.emails.iter().cloned());
        self.relations.extend(other.relations.iter().cloned());
        self.publications.extend(other.publications.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
            && self.emails.is_empty()
            && self.relations.is_empty()
            && self.publications.is_empty()
    }

    /// Features shared between a work item's authors (`self`) and a candidate.
    ///
    /// Relations are matched against emails in both directions; publications
    /// only against publications.
    pub fn conflicts_with(&self, candidate: &ConflictFeatures) -> BTreeSet<String> {
        let mut shared = BTreeSet::new();
        shared.extend(self.domains.intersection(&candidate.domains).cloned());
        shared.extend(self.relations.intersection(&candidate.emails).cloned());
        shared.extend(self.emails.intersection(&candidate.relations).cloned());
        shared.extend(self.emails.intersection(&candidate.emails).cloned());
        shared.extend(self.publications.intersection(&candidate.publications).cloned());
        shared
    }
}

/// Extracts the conflict features of a profile.
///
/// # Errors
///
/// `EngineError::ObfuscatedProfile` if any email is redacted.
pub fn extract(
    profile: &Profile,
    policy: ConflictPolicy,
    current_year: i32,
) -> EngineResult<ConflictFeatures> {
    if profile
        .emails
        .iter()
        .any(|e| e.starts_with(OBFUSCATED_PREFIX))
    {
        return Err(EngineError::ObfuscatedProfile(profile.id.clone()));
    }

    let cutoff = policy.cutoff(current_year);
    let recent = |end: Option<i32>| match (cutoff, end) {
        (Some(cutoff), Some(end)) => end > cutoff,
        _ => true,
    };

    let mut features = ConflictFeatures::default();
    features.emails.extend(profile.emails.iter().cloned());

    for entry in profile.history.iter().filter(|h| recent(h.end)) {
        features.domains.extend(subdomains(&entry.domain));
    }

    // The default policy always counts email domains; the windowed policy
    // only falls back to them when history has nothing recent.
    if cutoff.is_none() || features.domains.is_empty() {
        for email in &profile.emails {
            features.domains.extend(subdomains(email));
        }
    }

    for relation in &profile.relations {
        if relation.email.is_empty() {
            continue;
        }
        if !relation.is_time_bounded() || recent(relation.end) {
            features.relations.insert(relation.email.clone());
        }
    }

    for publication in &profile.publications {
        let counts = match (cutoff, publication.effective_year(current_year)) {
            (Some(cutoff), Some(year)) => year > cutoff,
            (Some(_), None) => false,
            (None, _) => true,
        };
        if counts {
            features.publications.insert(publication.id.clone());
        }
    }

    features
        .domains
        .retain(|d| !COMMON_DOMAINS.contains(&d.as_str()));
    Ok(features)
}

/// Union of the features of several profiles.
///
/// # Errors
///
/// Fails if any profile is obfuscated.
pub fn aggregate<'a, I>(
    profiles: I,
    policy: ConflictPolicy,
    current_year: i32,
) -> EngineResult<ConflictFeatures>
where
    I: IntoIterator<Item = &'a Profile>,
{
    let mut features = ConflictFeatures::default();
    for profile in profiles {
        features.merge(&extract(profile, policy, current_year)?);
    }
    Ok(features)
}

/// Domain suffixes of an email address or domain, most specific first.
///
/// `ada@iesl.cs.umass.edu` yields `iesl.cs.umass.edu`, `cs.umass.edu`,
/// `umass.edu`. The public suffix (`edu`, `ac.uk`, `edu.sg`, ...) is never
/// returned on its own, since it does not identify an institution. Unknown
/// top-level labels count as a one-label suffix.
pub fn subdomains(address: &str) -> Vec<String> {
    let domain = match address.split_once('@') {
        Some((_, domain)) => domain,
        None => address,
    };
    let labels: Vec<String> = domain
        .split('.')
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();

    let domain = labels.join(".");
    let suffix_labels = psl::suffix_str(&domain).map_or(1, |suffix| suffix.split('.').count().max(1));

    (0..labels.len().saturating_sub(suffix_labels))
        .map(|i| labels[i..].join("."))
        .collect()
}
