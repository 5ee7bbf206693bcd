//! End-to-end happy path test.
//!
//! Drives one review cycle through the engine the way the management
//! scripts do:
//!
//! 1. Setup for reviewers, with scores computed by an HTTP scoring service
//! 2. Setup for area chairs, with scores from a file stream
//! 3. A solver stand-in writes labelled proposals
//! 4. Deploy reviewers, area chairs and senior area chairs
//! 5. Carry a resubmission's prior reviewers and area chair over
//!
//! ## Running
//!
//! ```bash
//! cargo test -p revassign-e2e --test happy_path
//! ```

use std::sync::Arc;

use revassign_engine::config::{EngineConfig, ScoringConfig, VenueContext};
use revassign_engine::features::ConflictPolicy;
use revassign_engine::model::{
    HistoryEntry, PriorSubmission, Profile, ReassignmentChoice, ReassignmentRequest, Role, WorkItem,
};
use revassign_engine::permissions::PermissionScope;
use revassign_engine::scoring::HttpScoringService;
use revassign_engine::store::{InMemoryStore, Stores};
use revassign_engine::{AssignmentEngine, ScoreSource, SetupOptions};
use revassign_id::{CandidateId, GroupId, WorkItemId};
use revassign_reconcile::InstantClock;
use revassign_relations::{Head, NewRelation, RelationKind, RelationScope};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LABEL: &str = "solver-run-1";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn candidate(id: &str) -> CandidateId {
    CandidateId::parse(id).unwrap()
}

fn profile(id: &str, email: &str, domain: Option<&str>) -> Profile {
    let mut profile = Profile::new(candidate(id));
    profile.emails = vec![email.to_string()];
    profile.confirmed_emails = vec![email.to_string()];
    if let Some(domain) = domain {
        profile.history = vec![HistoryEntry {
            domain: domain.to_string(),
            start: Some(2018),
            end: None,
        }];
    }
    profile
}

fn work_item(number: u32, author: &str) -> WorkItem {
    WorkItem {
        id: WorkItemId::new(),
        number,
        authors: vec![candidate(author)],
        track: None,
        previous: None,
        reassignment: ReassignmentRequest::default(),
    }
}

async fn seed_venue() -> (VenueContext, Arc<InMemoryStore>, Vec<WorkItem>) {
    let mut ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
    ctx.use_senior_area_chairs = true;

    let mut resubmission = work_item(3, "~Author3");
    resubmission.previous = Some(PriorSubmission {
        venue: GroupId::parse("ACL/2024").unwrap(),
        number: 7,
        work_item: None,
    });
    resubmission.reassignment = ReassignmentRequest {
        reviewers: ReassignmentChoice::WantsNew,
        area_chair: ReassignmentChoice::Retain,
    };
    let papers = vec![work_item(1, "~Author1"), work_item(2, "~Author2"), resubmission];

    let store = Arc::new(InMemoryStore::new());
    let seeded = papers.clone();
    let seed_ctx = ctx.clone();
    store
        .update(move |s| {
            s.work_items = seeded;
            s.profiles = vec![
                profile("~Author1", "author1@cs.umass.edu", Some("cs.umass.edu")),
                profile("~Author2", "author2@gmail.com", None),
                profile("~Author3", "author3@gmail.com", None),
                profile("~Ada1", "ada@umass.edu", None),
                profile("~Bob1", "bob@mit.edu", None),
                profile("~Cyd1", "cyd@gmail.com", None),
                profile("~Chair1", "chair1@cmu.edu", None),
                profile("~Chair2", "chair2@stanford.edu", None),
                profile("~Senior1", "senior1@ox.ac.uk", None),
            ];
            s.add_members(&seed_ctx.committee_id(Role::Reviewer), ["~Ada1", "~Bob1", "~Cyd1"]);
            s.add_members(&seed_ctx.committee_id(Role::AreaChair), ["~Chair1", "~Chair2"]);
            s.add_members(&seed_ctx.committee_id(Role::SeniorAreaChair), ["~Senior1"]);
            s.add_members(
                &GroupId::parse("ACL/2024/Submission7/Reviewers").unwrap(),
                ["~Ada1", "~Cyd1"],
            );
            s.add_members(
                &GroupId::parse("ACL/2024/Submission7/Area_Chairs").unwrap(),
                ["~Chair1"],
            );
        })
        .await;

    (ctx, store, papers)
}

async fn mount_scoring_service(server: &MockServer, papers: &[WorkItem]) {
    Mock::given(method("POST"))
        .and(path("/expertise"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": "job-e2e"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/expertise/status"))
        .and(query_param("jobId", "job-e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Running", "description": "scoring"})))
        .up_to_n_times(2)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/expertise/status"))
        .and(query_param("jobId", "job-e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Completed", "description": "done"})))
        .mount(server)
        .await;

    let results: Vec<serde_json::Value> = papers
        .iter()
        .flat_map(|p| {
            ["~Ada1", "~Bob1", "~Cyd1"].map(|user| {
                json!({"submission": p.id.to_string(), "user": user, "score": 0.5 + f64::from(p.number) / 10.0})
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/expertise/results"))
        .and(query_param("jobId", "job-e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": results,
            "metadata": {"no_profile": [], "no_publications": ["~Cyd1"]}
        })))
        .mount(server)
        .await;
}

fn proposal(ctx: &VenueContext, role: Role, head: impl Into<Head>, tail: &str, number: Option<u32>) -> NewRelation {
    PermissionScope::for_role(ctx, role)
        .builder(ctx, RelationKind::ProposedAssignment, head, &candidate(tail), number)
        .weight(1.0)
        .label(LABEL)
        .build()
        .unwrap()
}

fn members(snapshot: &revassign_engine::store::MemorySnapshot, group: &GroupId) -> Vec<String> {
    let mut members = snapshot.groups.get(group).cloned().unwrap_or_default();
    members.sort();
    members
}

#[tokio::test]
async fn test_review_cycle_happy_path() {
    init_tracing();
    let (ctx, store, papers) = seed_venue().await;
    let server = MockServer::start().await;
    mount_scoring_service(&server, &papers).await;

    let config = EngineConfig {
        scoring: ScoringConfig {
            base_url: server.uri(),
            ..Default::default()
        },
        ..Default::default()
    };
    let scoring = HttpScoringService::new(&config.scoring).unwrap();
    let engine = AssignmentEngine::new(
        ctx.clone(),
        config,
        Stores::shared(store.clone()),
        Arc::new(InstantClock::new()),
    )
    .with_scoring(Arc::new(scoring));

    // 1. Reviewers: computed scores and conflicts.
    let status = engine
        .setup(
            Role::Reviewer,
            SetupOptions {
                scores: ScoreSource::Compute,
                conflicts: Some(ConflictPolicy::Default),
            },
        )
        .await
        .unwrap();
    assert_eq!(status.scores.as_ref().map(|s| s.created), Some(9));
    assert_eq!(status.no_publications, ["~Cyd1"]);
    // Ada's umass.edu matches Author1's cs.umass.edu history.
    assert_eq!(status.conflicts.as_ref().map(|c| c.conflicts), Some(1));

    // 2. Area chairs: streamed scores.
    let stream: String = papers
        .iter()
        .map(|p| format!("{},~Chair1,0.8\n#{},~Chair2,0.6\n", p.id, p.number))
        .collect();
    let status = engine
        .setup(
            Role::AreaChair,
            SetupOptions {
                scores: ScoreSource::Stream(stream.into_bytes()),
                conflicts: Some(ConflictPolicy::neurips()),
            },
        )
        .await
        .unwrap();
    assert_eq!(status.scores.map(|s| s.created), Some(6));

    // 3. Solver stand-in.
    let reviewer_proposals: Vec<NewRelation> = papers
        .iter()
        .flat_map(|p| {
            let tails: &[&str] = if p.number == 1 { &["~Bob1", "~Cyd1"] } else { &["~Ada1", "~Bob1"] };
            tails
                .iter()
                .map(|tail| proposal(&ctx, Role::Reviewer, p.id, tail, Some(p.number)))
                .collect::<Vec<_>>()
        })
        .collect();
    let chair_proposals: Vec<NewRelation> = papers
        .iter()
        .map(|p| {
            let chair = if p.number == 2 { "~Chair2" } else { "~Chair1" };
            proposal(&ctx, Role::AreaChair, p.id, chair, Some(p.number))
        })
        .collect();
    let senior_proposals = vec![proposal(&ctx, Role::SeniorAreaChair, candidate("~Chair1"), "~Senior1", None)];

    for (role, proposals) in [
        (Role::Reviewer, reviewer_proposals),
        (Role::AreaChair, chair_proposals),
        (Role::SeniorAreaChair, senior_proposals),
    ] {
        let scope = RelationScope::new(ctx.committee_id(role), RelationKind::ProposedAssignment);
        engine.replacer().insert(&scope, proposals).await.unwrap();
    }

    // 4. Deploy.
    let report = engine.deploy(Role::Reviewer, LABEL, false, true).await.unwrap();
    assert_eq!(report.assignments, 6);
    assert!(report.missing.is_empty());
    assert_eq!(report.reassignment_seed.as_ref().map(String::len), Some(8));

    let report = engine.deploy(Role::AreaChair, LABEL, false, false).await.unwrap();
    assert_eq!(report.assignments, 3);

    let report = engine.deploy(Role::SeniorAreaChair, LABEL, false, false).await.unwrap();
    assert_eq!(report.assignments, 1);
    assert_eq!(report.work_items, 2);
    assert!(report.unmapped.is_empty());

    // Deploying the same label again writes nothing new.
    let again = engine.deploy(Role::Reviewer, LABEL, false, false).await.unwrap();
    assert_eq!(again.assignments, 0);
    assert_eq!(again.already_deployed, 6);

    let snapshot = store.snapshot().await;
    assert_eq!(
        members(&snapshot, &ctx.paper_committee_id(1, Role::Reviewer)),
        ["~Bob1", "~Cyd1"]
    );
    assert_eq!(
        members(&snapshot, &ctx.paper_committee_id(1, Role::SeniorAreaChair)),
        ["~Senior1"]
    );
    assert_eq!(
        members(&snapshot, &ctx.paper_committee_id(3, Role::SeniorAreaChair)),
        ["~Senior1"]
    );
    assert!(!snapshot.groups.contains_key(&ctx.paper_committee_id(2, Role::SeniorAreaChair)));
    assert!(snapshot.groups.contains_key(&ctx.emergency_group(Role::Reviewer)));

    // 5. Carryover for the resubmission.
    let resubmission = papers[2].id;
    let report = engine.carryover(&[resubmission]).await.unwrap();
    assert_eq!(report.work_items, 1);
    assert_eq!(report.reassigned, 2);
    assert_eq!(report.retained, 1);

    let statuses = engine
        .relations(
            &RelationScope::new(ctx.committee_id(Role::Reviewer), RelationKind::Status).with_head(resubmission),
        )
        .await
        .unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|r| r.label.as_deref() == Some("Reassigned")));

    let ada_score = engine
        .relations(
            &RelationScope::new(ctx.committee_id(Role::Reviewer), RelationKind::AffinityScore)
                .with_head(resubmission)
                .with_tail(candidate("~Ada1")),
        )
        .await
        .unwrap();
    assert_eq!(ada_score.len(), 1);
    assert_eq!(ada_score[0].weight, Some(0.0));

    let snapshot = store.snapshot().await;
    let prior_reviewers = members(&snapshot, &GroupId::parse("ACL/2024/Submission7/Reviewers").unwrap());
    assert!(prior_reviewers.contains(&ctx.paper_submitted_id(3, Role::Reviewer).into_inner()));
    let prior_chairs = members(&snapshot, &GroupId::parse("ACL/2024/Submission7/Area_Chairs").unwrap());
    assert!(prior_chairs.contains(&ctx.paper_committee_id(3, Role::AreaChair).into_inner()));
}
