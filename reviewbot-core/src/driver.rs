//! Applies verdicts to the review record of a request.
//!
//! A review is only ever moved out of `new`. Anything else was concluded by an
//! earlier run or by someone else and is left alone, which makes re-running
//! the bot over the same requests harmless.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::ServiceError;
use crate::model::{RequestId, ReviewState};
use crate::policy::ReviewRequest;
use crate::service::BuildService;
use crate::verdict::Verdict;

/// Messages submitted with review state changes.
///
/// A state without a configured message is submitted with its own name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReviewMessages {
    pub accepted: Option<String>,
    pub declined: Option<String>,
}

impl ReviewMessages {
    /// The messages used when checking against `reference_project`.
    pub fn for_reference(reference_project: &str) -> Self {
        Self {
            accepted: Some("ok".to_string()),
            declined: Some(format!(
                "the package needs to be accepted in {} first",
                reference_project
            )),
        }
    }

    pub fn message_for(&self, state: ReviewState) -> String {
        let configured = match state {
            ReviewState::Accepted => self.accepted.as_deref(),
            ReviewState::Declined => self.declined.as_deref(),
            _ => None,
        };
        configured.unwrap_or(state.as_str()).to_string()
    }
}

/// What happened to the review of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// The review was moved to `state`.
    Changed { state: ReviewState },
    /// Dry run: the review would have been moved to `state`.
    WouldChange { state: ReviewState },
    /// The verdict was `Ignore`; nothing to do this run.
    NoOpinion,
    /// The review is not `new` and was left as is.
    NotChanged { state: ReviewState },
    /// The request has no review addressed to us.
    NotReviewer,
    /// The request could not be read back.
    Missing,
    /// The service refused the change.
    Rejected { message: String },
}

pub struct ReviewDriver<'a> {
    service: &'a dyn BuildService,
    reviewer: &'a str,
    messages: &'a ReviewMessages,
    dry_run: bool,
}

impl<'a> ReviewDriver<'a> {
    pub fn new(
        service: &'a dyn BuildService,
        reviewer: &'a str,
        messages: &'a ReviewMessages,
        dry_run: bool,
    ) -> Self {
        Self {
            service,
            reviewer,
            messages,
            dry_run,
        }
    }

    /// Apply `verdict` to our review on request `id`.
    ///
    /// The request is read again first so the decision is based on the
    /// current review state, not on the copy the verdict was computed from.
    pub async fn apply(&self, id: &RequestId, verdict: Verdict) -> Result<Transition, ServiceError> {
        let new_state = match verdict {
            Verdict::Accept => {
                info!("{} is good", id);
                ReviewState::Accepted
            }
            Verdict::Decline => {
                info!("{} is not acceptable", id);
                ReviewState::Declined
            }
            Verdict::Ignore => {
                info!("{}: ignoring", id);
                return Ok(Transition::NoOpinion);
            }
        };

        let Some(request) = self.service.request(id).await? else {
            error!("{} vanished before its review could be set", id);
            return Ok(Transition::Missing);
        };

        match request.review_state_for_user(self.reviewer) {
            None => {
                info!(
                    "can't change state, {} does not have '{}' as reviewer",
                    id, self.reviewer
                );
                Ok(Transition::NotReviewer)
            }
            Some(ReviewState::New) => self.change(id, new_state).await,
            Some(state) => {
                debug!("{} review in state '{}' not changed", id, state);
                Ok(Transition::NotChanged { state })
            }
        }
    }

    async fn change(&self, id: &RequestId, state: ReviewState) -> Result<Transition, ServiceError> {
        debug!("setting {} to {}", id, state);
        if self.dry_run {
            return Ok(Transition::WouldChange { state });
        }

        let message = self.messages.message_for(state);
        match self
            .service
            .change_review_state(id, self.reviewer, state, &message)
            .await
        {
            Ok(()) => Ok(Transition::Changed { state }),
            Err(e) if e.is_rejected() => {
                error!("could not set {} to {}: {}", id, state, e);
                Ok(Transition::Rejected {
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Add a review to request `id`. Returns `false` when the service refused it.
    pub async fn add_review(
        &self,
        id: &RequestId,
        review: &ReviewRequest,
    ) -> Result<bool, ServiceError> {
        info!("{} needs review by {}", id, review.target);
        if self.dry_run {
            return Ok(true);
        }

        match self
            .service
            .add_review(id, &review.target, &review.message)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_rejected() => {
                error!("could not add review by {} to {}: {}", review.target, id, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
