//! Batch processing of requests.
//!
//! Requests are processed one after another. A failure while processing one
//! request is recorded and the batch moves on; reviews already changed for
//! earlier requests stay changed.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::classifier::{ActionOutcome, Classifier, ClassifierConfig};
use crate::driver::{ReviewDriver, ReviewMessages, Transition};
use crate::error::ServiceError;
use crate::model::{ActionKind, Request, RequestId, ReviewerTarget};
use crate::policy::{IncidentPolicyKind, IncidentReviewPolicy, ReviewRequest};
use crate::service::BuildService;
use crate::verdict::Verdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    /// Identity whose reviews the bot sets.
    pub reviewer: String,
    /// User added as reviewer to incidents for the sentinel release project.
    pub secondary_reviewer: Option<String>,
    pub incident_policy: IncidentPolicyKind,
    pub messages: ReviewMessages,
    pub dry_run: bool,
}

impl EngineConfig {
    pub fn new(reference_project: impl Into<String>, reviewer: impl Into<String>) -> Self {
        let classifier = ClassifierConfig::new(reference_project);
        let messages = ReviewMessages::for_reference(&classifier.reference_project);
        Self {
            classifier,
            reviewer: reviewer.into(),
            secondary_reviewer: None,
            incident_policy: IncidentPolicyKind::default(),
            messages,
            dry_run: false,
        }
    }
}

/// What the bot did with one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestOutcome {
    pub id: RequestId,
    pub verdict: Verdict,
    pub actions: Vec<ActionOutcome>,
    pub added_reviews: Vec<ReviewerTarget>,
    #[serde(flatten)]
    pub transition: Transition,
}

/// A request the bot could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestFailure {
    pub id: RequestId,
    pub error: String,
}

/// Summary of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<RequestOutcome>,
    pub failures: Vec<RequestFailure>,
}

impl BatchReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, id: &RequestId, error: impl Into<String>) {
        let error = error.into();
        error!("{}: {}", id, error);
        self.failures.push(RequestFailure {
            id: id.clone(),
            error,
        });
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        info!(
            "Checked {} request(s), {} failed",
            self.outcomes.len() + self.failures.len(),
            self.failures.len()
        );
        self
    }

    /// True when every request of the batch was processed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self, id: &str) -> Option<&RequestOutcome> {
        self.outcomes.iter().find(|o| o.id.0 == id)
    }
}

pub struct ReviewEngine {
    service: Arc<dyn BuildService>,
    config: EngineConfig,
    policy: Box<dyn IncidentReviewPolicy>,
}

impl ReviewEngine {
    pub fn new(service: Arc<dyn BuildService>, config: EngineConfig) -> Self {
        let policy = config.incident_policy.build();
        Self::with_policy(service, config, policy)
    }

    /// Use a custom incident review policy instead of the configured kind.
    pub fn with_policy(
        service: Arc<dyn BuildService>,
        config: EngineConfig,
        policy: Box<dyn IncidentReviewPolicy>,
    ) -> Self {
        Self {
            service,
            config,
            policy,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch and check the requests with the given ids.
    pub async fn check_ids(&self, ids: &[RequestId]) -> BatchReport {
        let mut report = BatchReport::start();

        for id in ids {
            match self.service.request(id).await {
                Ok(Some(request)) => self.check_into(&mut report, &request).await,
                Ok(None) => report.fail(id, "request not found"),
                Err(e) => report.fail(id, e.to_string()),
            }
        }

        report.finish()
    }

    /// Check every request that waits for a review by the configured user.
    pub async fn check_awaiting_review(&self) -> Result<BatchReport, ServiceError> {
        let requests = self
            .service
            .requests_awaiting_review(&self.config.reviewer)
            .await?;
        info!(
            "{} request(s) waiting for review by {}",
            requests.len(),
            self.config.reviewer
        );
        Ok(self.check_requests(&requests).await)
    }

    pub async fn check_requests(&self, requests: &[Request]) -> BatchReport {
        let mut report = BatchReport::start();
        for request in requests {
            self.check_into(&mut report, request).await;
        }
        report.finish()
    }

    async fn check_into(&self, report: &mut BatchReport, request: &Request) {
        match self.check_request(request).await {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(e) => report.fail(&request.id, e.to_string()),
        }
    }

    /// Classify one request, add the reviewers it needs, and apply the verdict.
    pub async fn check_request(&self, request: &Request) -> Result<RequestOutcome, ServiceError> {
        let service = self.service.as_ref();
        let classification = Classifier::new(service, &self.config.classifier)
            .classify(request)
            .await?;
        let mut verdict = classification.verdict;

        let driver = ReviewDriver::new(
            service,
            &self.config.reviewer,
            &self.config.messages,
            self.config.dry_run,
        );

        let secondary = match (&self.config.secondary_reviewer, classification.needs_secondary_review) {
            (Some(user), true) => Some(ReviewRequest {
                target: ReviewerTarget::User(user.clone()),
                message: format!("{} needs review by {}", request.id, user),
            }),
            _ => None,
        };

        let mut reviews: Vec<ReviewRequest> = secondary.iter().cloned().collect();
        for action in request
            .actions
            .iter()
            .filter(|action| action.kind == ActionKind::Incident)
        {
            reviews.extend(self.policy.extra_reviews(service, request, action).await?);
        }

        let mut seen = HashSet::new();
        let mut added_reviews = Vec::new();
        for review in reviews {
            if !seen.insert(review.target.clone()) {
                continue;
            }
            if request.has_reviewer(&review.target) {
                info!("{} already has a review by {}", request.id, review.target);
                continue;
            }
            if driver.add_review(&request.id, &review).await? {
                added_reviews.push(review.target.clone());
            } else if secondary.as_ref() == Some(&review) {
                warn!(
                    "{}: secondary review could not be added, not deciding this run",
                    request.id
                );
                verdict = Verdict::Ignore;
            }
        }

        let transition = driver.apply(&request.id, verdict).await?;

        Ok(RequestOutcome {
            id: request.id.clone(),
            verdict,
            actions: classification.actions,
            added_reviews,
            transition,
        })
    }
}
