//! Line-oriented score input: `work_item,candidate,score` per line.

use std::collections::BTreeSet;

use revassign_id::{CandidateId, WorkItemId};
use revassign_relations::normalize_score;

use crate::model::WorkItem;

/// One resolved score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTriple {
    pub work_item: WorkItemId,
    pub number: u32,
    pub candidate: CandidateId,
    pub score: f64,
}

/// Parsed stream contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedScores {
    pub triples: Vec<ScoreTriple>,
    /// Lines that could not be split into a key pair and a number.
    pub malformed: usize,
    /// Work item keys that match no submission.
    pub unresolved: BTreeSet<String>,
}

/// Resolves a work item key: a work item id, or a submission number.
pub fn resolve<'a>(key: &str, work_items: &'a [WorkItem]) -> Option<&'a WorkItem> {
    if let Ok(id) = WorkItemId::parse(key) {
        return work_items.iter().find(|w| w.id == id);
    }
    let number: u32 = key.trim_start_matches('#').parse().ok()?;
    work_items.iter().find(|w| w.number == number)
}

/// Parses score lines against the known work items.
///
/// Blank lines are ignored. Scores are clamped to `[0, +inf)` and rounded.
pub fn parse_stream(input: &[u8], work_items: &[WorkItem]) -> ParsedScores {
    let text = String::from_utf8_lossy(input);
    let mut parsed = ParsedScores::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [key, candidate, score, ..] = fields.as_slice() else {
            parsed.malformed += 1;
            continue;
        };
        let (Ok(candidate), Ok(score)) = (CandidateId::parse(candidate), score.parse::<f64>()) else {
            parsed.malformed += 1;
            continue;
        };
        if !score.is_finite() {
            parsed.malformed += 1;
            continue;
        }
        let Some(work_item) = resolve(key, work_items) else {
            parsed.unresolved.insert((*key).to_string());
            continue;
        };

        parsed.triples.push(ScoreTriple {
            work_item: work_item.id,
            number: work_item.number,
            candidate,
            score: normalize_score(score),
        });
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_item(number: u32) -> WorkItem {
        WorkItem {
            id: WorkItemId::new(),
            number,
            authors: Vec::new(),
            track: None,
            previous: None,
            reassignment: Default::default(),
        }
    }

    #[test]
    fn test_parse_stream_reports_bad_lines() {
        let items = vec![work_item(1), work_item(2)];
        let input = format!(
            "{},~Ada1,0.123456\n\n2, ~Bob1 , -3\nsub_nope,~Ada1,0.5\n99,~Ada1,0.5\nonly,two\n1,~Ada1,abc\n",
            items[0].id
        );

        let parsed = parse_stream(input.as_bytes(), &items);
        assert_eq!(parsed.triples.len(), 2);
        assert_eq!(parsed.triples[0].work_item, items[0].id);
        assert_eq!(parsed.triples[0].score, 0.1235);
        assert_eq!(parsed.triples[1].number, 2);
        assert_eq!(parsed.triples[1].candidate.as_str(), "~Bob1");
        assert_eq!(parsed.triples[1].score, 0.0);
        assert_eq!(parsed.malformed, 2);
        assert_eq!(
            parsed.unresolved,
            BTreeSet::from(["99".to_string(), "sub_nope".to_string()])
        );
    }
}
