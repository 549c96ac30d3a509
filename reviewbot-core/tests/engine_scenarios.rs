use std::sync::Arc;

use reviewbot_core::{
    Action, ActionKind, CheckReason, EngineConfig, InMemoryBuildService, IncidentPolicyKind,
    PackageOwner, Request, RequestId, RequestState, Review, ReviewEngine, ReviewState,
    ReviewerTarget, Transition, Verdict,
};

const FACTORY: &str = "openSUSE:Factory";
const BOT: &str = "factory-auto";
const MAINT: &str = "openSUSE:Maintenance:4242";

fn config() -> EngineConfig {
    let mut config = EngineConfig::new(FACTORY, BOT);
    config.secondary_reviewer = Some("factory-source".to_string());
    config.classifier.secondary_release_project = Some("openSUSE:CPE:SLE-12".to_string());
    config
}

fn engine(service: &Arc<InMemoryBuildService>, config: EngineConfig) -> ReviewEngine {
    ReviewEngine::new(service.clone(), config)
}

fn bot_review() -> Review {
    Review::new(ReviewerTarget::User(BOT.to_string()), ReviewState::New)
}

fn submit_request(id: &str, src_project: &str, rev: &str) -> Request {
    Request::new(id, RequestState::Review)
        .with_creator("alice")
        .with_action(
            Action::new(ActionKind::Submit)
                .with_source(src_project, "vim", Some(rev))
                .with_target("openSUSE:13.2", Some("vim")),
        )
        .with_review(bot_review())
}

fn incident_request(id: &str, release_project: &str) -> Request {
    Request::new(id, RequestState::Review)
        .with_creator("mallory")
        .with_action(
            Action::new(ActionKind::Incident)
                .with_source(MAINT, "vim", Some("1"))
                .with_target("openSUSE:Maintenance", None)
                .with_release_project(release_project),
        )
        .with_review(bot_review())
}

async fn bot_state(service: &InMemoryBuildService, id: &str) -> Option<ReviewState> {
    use reviewbot_core::BuildService;
    service
        .request(&RequestId::from(id))
        .await
        .unwrap()
        .and_then(|r| r.review_state_for_user(BOT))
}

#[tokio::test]
async fn test_incident_for_new_package_stays_new() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision(MAINT, "vim", "1", "abc123")
            .with_request(incident_request("1", "openSUSE:13.2:Update")),
    );

    let report = engine(&service, config())
        .check_ids(&[RequestId::from("1")])
        .await;

    let outcome = report.outcome("1").unwrap();
    assert_eq!(outcome.verdict, Verdict::Ignore);
    assert_eq!(outcome.transition, Transition::NoOpinion);
    assert_eq!(outcome.actions[0].reason, CheckReason::NewPackage);
    assert_eq!(bot_state(&service, "1").await, Some(ReviewState::New));
    assert!(service.review_changes().await.is_empty());
}

#[tokio::test]
async fn test_submit_found_in_history_is_accepted() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision("editors", "vim", "9", "abc123")
            .with_package(FACTORY, "vim", "xyz999")
            .with_history(
                FACTORY,
                "vim",
                &[
                    ("5", "xyz999"),
                    ("4", "ddd"),
                    ("3", "abc123"),
                    ("2", "bbb"),
                    ("1", "aaa"),
                ],
            )
            .with_request(submit_request("2", "editors", "9")),
    );

    let report = engine(&service, config())
        .check_ids(&[RequestId::from("2")])
        .await;

    let outcome = report.outcome("2").unwrap();
    assert_eq!(outcome.verdict, Verdict::Accept);
    assert_eq!(
        outcome.actions[0].reason,
        CheckReason::InHistory {
            revision: "3".to_string()
        }
    );
    assert_eq!(
        outcome.transition,
        Transition::Changed {
            state: ReviewState::Accepted
        }
    );
    assert_eq!(bot_state(&service, "2").await, Some(ReviewState::Accepted));

    let changes = service.review_changes().await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].message, "ok");
}

#[tokio::test]
async fn test_sibling_still_in_review_means_ignore() {
    let sibling = Request::new("4", RequestState::Review).with_action(
        Action::new(ActionKind::Submit)
            .with_source("home:bob", "vim", Some("2"))
            .with_target(FACTORY, Some("vim")),
    );
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision("editors", "vim", "9", "abc123")
            .with_revision("home:bob", "vim", "2", "abc123")
            .with_package(FACTORY, "vim", "xyz999")
            .with_history(FACTORY, "vim", &[("5", "xyz999"), ("4", "ddd")])
            .with_request(submit_request("3", "editors", "9"))
            .with_request(sibling),
    );

    let report = engine(&service, config())
        .check_ids(&[RequestId::from("3")])
        .await;

    let outcome = report.outcome("3").unwrap();
    assert_eq!(outcome.verdict, Verdict::Ignore);
    assert_eq!(
        outcome.actions[0].reason,
        CheckReason::PendingInReview {
            request: RequestId::from("4")
        }
    );
    assert_eq!(bot_state(&service, "3").await, Some(ReviewState::New));
}

#[tokio::test]
async fn test_sibling_in_state_new_makes_request_safe() {
    let sibling = Request::new("4", RequestState::New).with_action(
        Action::new(ActionKind::Submit)
            .with_source("home:bob", "vim", Some("2"))
            .with_target(FACTORY, Some("vim")),
    );
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision("editors", "vim", "9", "abc123")
            .with_revision("home:bob", "vim", "2", "abc123")
            .with_package(FACTORY, "vim", "xyz999")
            .with_request(submit_request("3", "editors", "9"))
            .with_request(sibling),
    );

    let report = engine(&service, config())
        .check_ids(&[RequestId::from("3")])
        .await;

    assert_eq!(report.outcome("3").unwrap().verdict, Verdict::Accept);
    assert_eq!(bot_state(&service, "3").await, Some(ReviewState::Accepted));
}

#[tokio::test]
async fn test_declined_review_carries_reference_message() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision("editors", "vim", "9", "abc123")
            .with_package(FACTORY, "vim", "xyz999")
            .with_request(submit_request("6", "editors", "9")),
    );

    engine(&service, config())
        .check_ids(&[RequestId::from("6")])
        .await;

    let changes = service.review_changes().await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].state, ReviewState::Declined);
    assert_eq!(
        changes[0].message,
        "the package needs to be accepted in openSUSE:Factory first"
    );
}

#[tokio::test]
async fn test_rerunning_a_concluded_request_changes_nothing() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision("editors", "vim", "9", "abc123")
            .with_package(FACTORY, "vim", "abc123")
            .with_request(submit_request("7", "editors", "9")),
    );
    let engine = engine(&service, config());

    let first = engine.check_ids(&[RequestId::from("7")]).await;
    assert_eq!(
        first.outcome("7").unwrap().transition,
        Transition::Changed {
            state: ReviewState::Accepted
        }
    );

    let second = engine.check_ids(&[RequestId::from("7")]).await;
    assert_eq!(
        second.outcome("7").unwrap().transition,
        Transition::NotChanged {
            state: ReviewState::Accepted
        }
    );
    assert_eq!(service.review_changes().await.len(), 1);
}

#[tokio::test]
async fn test_batch_continues_past_a_failing_request() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .fail_project("broken")
            .with_revision("editors", "vim", "9", "abc123")
            .with_package(FACTORY, "vim", "abc123")
            .with_request(submit_request("8", "broken", "1"))
            .with_request(submit_request("9", "editors", "9")),
    );

    let report = engine(&service, config())
        .check_ids(&[
            RequestId::from("8"),
            RequestId::from("404"),
            RequestId::from("9"),
        ])
        .await;

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].id, RequestId::from("8"));
    assert_eq!(report.failures[1].id, RequestId::from("404"));
    assert_eq!(report.outcome("9").unwrap().verdict, Verdict::Accept);
}

#[tokio::test]
async fn test_awaiting_review_mode_only_picks_new_reviews() {
    let concluded = Request::new("11", RequestState::Review).with_review(Review::new(
        ReviewerTarget::User(BOT.to_string()),
        ReviewState::Accepted,
    ));
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision("editors", "vim", "9", "abc123")
            .with_package(FACTORY, "vim", "abc123")
            .with_request(submit_request("10", "editors", "9"))
            .with_request(concluded),
    );

    let report = engine(&service, config())
        .check_awaiting_review()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].id, RequestId::from("10"));
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision(MAINT, "vim", "1", "abc123")
            .with_request(incident_request("12", "openSUSE:CPE:SLE-12")),
    );
    let mut config = config();
    config.dry_run = true;

    let report = engine(&service, config)
        .check_ids(&[RequestId::from("12")])
        .await;

    assert_eq!(
        report.outcome("12").unwrap().added_reviews,
        vec![ReviewerTarget::User("factory-source".to_string())]
    );
    assert!(service.added_reviews().await.is_empty());
    assert!(service.review_changes().await.is_empty());
}

#[tokio::test]
async fn test_sentinel_incident_gets_secondary_reviewer_once() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision(MAINT, "vim", "1", "abc123")
            .with_package(FACTORY, "vim", "abc123")
            .with_request(incident_request("13", "openSUSE:CPE:SLE-12")),
    );
    let engine = engine(&service, config());

    let report = engine.check_ids(&[RequestId::from("13")]).await;
    let outcome = report.outcome("13").unwrap();
    assert_eq!(outcome.verdict, Verdict::Accept);
    assert_eq!(
        outcome.added_reviews,
        vec![ReviewerTarget::User("factory-source".to_string())]
    );

    // The second run sees the review that was added by the first one.
    let report = engine.check_ids(&[RequestId::from("13")]).await;
    assert!(report.outcome("13").unwrap().added_reviews.is_empty());
    assert_eq!(service.added_reviews().await.len(), 1);
}

#[tokio::test]
async fn test_refused_secondary_review_defers_the_decision() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision(MAINT, "vim", "1", "abc123")
            .with_package(FACTORY, "vim", "abc123")
            .with_request(incident_request("14", "openSUSE:CPE:SLE-12"))
            .reject_mutations_for("14"),
    );

    let report = engine(&service, config())
        .check_ids(&[RequestId::from("14")])
        .await;

    let outcome = report.outcome("14").unwrap();
    assert_eq!(outcome.verdict, Verdict::Ignore);
    assert_eq!(outcome.transition, Transition::NoOpinion);
    assert!(outcome.added_reviews.is_empty());
}

#[tokio::test]
async fn test_maintainer_policy_requests_devel_review() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision(MAINT, "vim", "1", "abc123")
            .with_owner(
                "vim",
                PackageOwner {
                    project: "editors".to_string(),
                    package: Some("vim".to_string()),
                    maintainers: vec!["alice".to_string()],
                },
            )
            .with_request(incident_request("15", "openSUSE:13.2:Update")),
    );
    let mut config = config();
    config.incident_policy = IncidentPolicyKind::Maintainers;

    let report = engine(&service, config)
        .check_ids(&[RequestId::from("15")])
        .await;

    assert_eq!(
        report.outcome("15").unwrap().added_reviews,
        vec![ReviewerTarget::Package {
            project: "editors".to_string(),
            package: "vim".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_revision("editors", "vim", "9", "abc123")
            .with_package(FACTORY, "vim", "abc123")
            .with_request(submit_request("16", "editors", "9")),
    );

    let report = engine(&service, config())
        .check_ids(&[RequestId::from("16")])
        .await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["outcomes"][0]["id"], "16");
    assert_eq!(json["outcomes"][0]["verdict"], "accept");
    assert_eq!(json["outcomes"][0]["transition"], "changed");
    assert_eq!(json["outcomes"][0]["state"], "accepted");
    assert_eq!(json["outcomes"][0]["actions"][0]["reason"], "in_reference");
}

#[tokio::test]
async fn test_declined_release_report_has_one_package_key() {
    let release = Request::new("17", RequestState::Review)
        .with_action(
            Action::new(ActionKind::Release)
                .with_source(MAINT, "vim", None)
                .with_target("openSUSE:13.2:Update", Some("vim")),
        )
        .with_review(bot_review());
    let service = Arc::new(
        InMemoryBuildService::new()
            .with_package(MAINT, "vim", "abc123")
            .with_request(release),
    );

    let report = engine(&service, config())
        .check_ids(&[RequestId::from("17")])
        .await;
    let text = serde_json::to_string(&report).unwrap();
    assert_eq!(text.matches("\"package\"").count(), 1);

    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let action = &json["outcomes"][0]["actions"][0];
    assert_eq!(json["outcomes"][0]["verdict"], "decline");
    assert_eq!(action["reason"], "not_a_link");
    assert_eq!(action["package"], serde_json::Value::Null);
    assert_eq!(action["source_package"], "vim");
}
