//! Per-action classification of a request against the reference project.
//!
//! Every action is mapped to the source it carries and the package name it
//! must be found under in the reference project. The checks then run in a
//! fixed order and stop at the first decisive answer:
//!
//! 1. the reference head (missing package: `Ignore`, same content: `Accept`)
//! 2. the bounded history of the reference package (`Accept` on a match)
//! 3. open requests into the reference package (`Accept`, `Ignore` or `Decline`)
//!
//! Action verdicts are reduced with [`Verdict::combine`].

use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;
use crate::history::{HistoryMatch, HistoryScanner, DEFAULT_HISTORY_LIMIT};
use crate::model::{Action, ActionKind, Fingerprint, Request, RequestId};
use crate::pending::{PendingMatch, PendingScanner};
use crate::resolver::{ReleaseTarget, SourceResolver};
use crate::service::BuildService;
use crate::verdict::Verdict;

/// Pseudo-package of maintenance releases that never carries sources.
pub const PATCHINFO_PACKAGE: &str = "patchinfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Upstream project submissions are checked against.
    pub reference_project: String,
    /// Number of reference revisions searched.
    pub history_limit: usize,
    /// Incidents tagged with this release project need a secondary review.
    pub secondary_release_project: Option<String>,
}

impl ClassifierConfig {
    pub fn new(reference_project: impl Into<String>) -> Self {
        Self {
            reference_project: reference_project.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            secondary_release_project: None,
        }
    }
}

/// Why an action got its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CheckReason {
    /// The reference project has no such package yet.
    NewPackage,
    /// The reference head has the same content.
    InReference,
    /// A recent reference revision has the same content.
    InHistory { revision: String },
    /// An open request in state `new` carries the same content.
    PendingAccepted { request: RequestId },
    /// An open request still in review carries the same content.
    PendingInReview { request: RequestId },
    /// The content is nowhere in the reference project.
    NotInReference,
    /// The source of the action could not be resolved.
    SourceNotFound,
    /// The action lacks the source or target fields its kind needs.
    IncompleteAction,
    /// The released package is not a link at all.
    NotALink { source_package: String },
    /// The released package links somewhere other than the target project.
    WrongLinkTarget {
        source_package: String,
        link_project: String,
    },
    /// Same-project links kept forwarding.
    LinkTooDeep { source_package: String },
    /// The action kind is not evaluated.
    Unsupported { kind: String },
}

impl fmt::Display for CheckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewPackage => write!(f, "new package"),
            Self::InReference => write!(f, "same sources in reference project"),
            Self::InHistory { revision } => write!(f, "found in reference history at rev {}", revision),
            Self::PendingAccepted { request } => write!(f, "already submitted by {}", request),
            Self::PendingInReview { request } => write!(f, "{} still in review", request),
            Self::NotInReference => write!(f, "not in reference project"),
            Self::SourceNotFound => write!(f, "source not found"),
            Self::IncompleteAction => write!(f, "incomplete action"),
            Self::NotALink { source_package } => write!(f, "{} is not a link", source_package),
            Self::WrongLinkTarget {
                source_package,
                link_project,
            } => {
                write!(f, "{} links to {}", source_package, link_project)
            }
            Self::LinkTooDeep { source_package } => {
                write!(f, "{} is linked too deeply", source_package)
            }
            Self::Unsupported { kind } => write!(f, "unhandled request type {}", kind),
        }
    }
}

/// Verdict of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub kind: String,
    /// Package name checked in the reference project, when one was derived.
    pub package: Option<String>,
    pub verdict: Verdict,
    #[serde(flatten)]
    pub reason: CheckReason,
}

/// Result of classifying a whole request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub verdict: Verdict,
    pub actions: Vec<ActionOutcome>,
    /// An incident targets the configured release project.
    pub needs_secondary_review: bool,
}

/// Source content an action carries.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceRef {
    project: String,
    package: String,
    revision: Option<String>,
}

/// What to evaluate for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckPlan {
    /// Look for the content of `source` under `package` in the reference.
    Check { source: SourceRef, package: String },
    /// The action is not evaluated at all.
    Skip,
    /// The verdict is known without touching the reference project.
    Decided {
        package: Option<String>,
        verdict: Verdict,
        reason: CheckReason,
    },
}

pub struct Classifier<'a> {
    config: &'a ClassifierConfig,
    resolver: SourceResolver<'a>,
    history: HistoryScanner<'a>,
    pending: PendingScanner<'a>,
}

impl<'a> Classifier<'a> {
    pub fn new(service: &'a dyn BuildService, config: &'a ClassifierConfig) -> Self {
        Self {
            config,
            resolver: SourceResolver::new(service),
            history: HistoryScanner::new(service, config.history_limit),
            pending: PendingScanner::new(service),
        }
    }

    /// Classify every action of `request` and reduce to one verdict.
    pub async fn classify(&self, request: &Request) -> Result<Classification, ServiceError> {
        let mut overall = Verdict::Ignore;
        let mut outcomes = Vec::new();
        let mut needs_secondary_review = false;

        for action in &request.actions {
            if action.kind == ActionKind::Incident && self.routes_to_secondary_review(action) {
                debug!("{} needs a secondary review", request.id);
                needs_secondary_review = true;
            }

            let outcome = match self.plan(action).await? {
                CheckPlan::Skip => continue,
                CheckPlan::Decided {
                    package,
                    verdict,
                    reason,
                } => ActionOutcome {
                    kind: action.kind.to_string(),
                    package,
                    verdict,
                    reason,
                },
                CheckPlan::Check { source, package } => {
                    let (verdict, reason) = self.check_package(&request.id, &source, &package).await?;
                    ActionOutcome {
                        kind: action.kind.to_string(),
                        package: Some(package),
                        verdict,
                        reason,
                    }
                }
            };

            debug!(
                "{} {}: {} ({})",
                request.id, outcome.kind, outcome.verdict, outcome.reason
            );
            overall = overall.combine(outcome.verdict);
            outcomes.push(outcome);
        }

        Ok(Classification {
            verdict: overall,
            actions: outcomes,
            needs_secondary_review,
        })
    }

    fn routes_to_secondary_review(&self, action: &Action) -> bool {
        match (
            &self.config.secondary_release_project,
            &action.target_release_project,
        ) {
            (Some(sentinel), Some(tag)) => sentinel == tag,
            _ => false,
        }
    }

    /// Derive the source and the reference package name for an action.
    async fn plan(&self, action: &Action) -> Result<CheckPlan, ServiceError> {
        let (Some(src_project), Some(src_package)) =
            (&action.source_project, &action.source_package)
        else {
            return Ok(match &action.kind {
                ActionKind::Other(kind) => unsupported(kind),
                _ => incomplete(),
            });
        };

        match &action.kind {
            ActionKind::Submit => {
                let Some(target_package) = &action.target_package else {
                    return Ok(incomplete());
                };
                Ok(CheckPlan::Check {
                    source: SourceRef {
                        project: src_project.clone(),
                        package: src_package.clone(),
                        revision: action.source_revision.clone(),
                    },
                    package: target_package.clone(),
                })
            }

            ActionKind::Release => {
                if src_package == PATCHINFO_PACKAGE {
                    debug!("skipping {}/{}", src_project, src_package);
                    return Ok(CheckPlan::Skip);
                }
                let Some(target_project) = &action.target_project else {
                    return Ok(incomplete());
                };

                let reason = match self
                    .resolver
                    .resolve_release_target(src_project, src_package, target_project)
                    .await?
                {
                    ReleaseTarget::Linked { package } => {
                        // Released sources are the current head of the
                        // maintenance package.
                        return Ok(CheckPlan::Check {
                            source: SourceRef {
                                project: src_project.clone(),
                                package: src_package.clone(),
                                revision: None,
                            },
                            package,
                        });
                    }
                    ReleaseTarget::NotALink { package } => CheckReason::NotALink {
                        source_package: package,
                    },
                    ReleaseTarget::WrongProject { package, project } => {
                        CheckReason::WrongLinkTarget {
                            source_package: package,
                            link_project: project,
                        }
                    }
                    ReleaseTarget::TooDeep { package } => CheckReason::LinkTooDeep {
                        source_package: package,
                    },
                };

                error!(
                    "{}/{} is not a link to {}: {}",
                    src_project, src_package, target_project, reason
                );
                Ok(CheckPlan::Decided {
                    package: None,
                    verdict: Verdict::Decline,
                    reason,
                })
            }

            ActionKind::Incident => Ok(CheckPlan::Check {
                source: SourceRef {
                    project: src_project.clone(),
                    package: src_package.clone(),
                    revision: action.source_revision.clone(),
                },
                package: src_package.clone(),
            }),

            ActionKind::Other(kind) => Ok(unsupported(kind)),
        }
    }

    /// Run the reference, history and pending-request checks for one source.
    async fn check_package(
        &self,
        request_id: &RequestId,
        source: &SourceRef,
        package: &str,
    ) -> Result<(Verdict, CheckReason), ServiceError> {
        let reference = self.config.reference_project.as_str();

        let Some(fingerprint) = self
            .resolver
            .fingerprint(&source.project, &source.package, source.revision.as_deref())
            .await?
        else {
            warn!(
                "{}/{}@{} not found, cannot check it",
                source.project,
                source.package,
                source.revision.as_deref().unwrap_or("head")
            );
            return Ok((Verdict::Ignore, CheckReason::SourceNotFound));
        };

        info!(
            "{}/{}@{} -> {}/{}",
            source.project,
            source.package,
            fingerprint.short(),
            reference,
            package
        );

        if let Some(verdict) = self.check_reference(reference, package, &fingerprint).await? {
            return Ok(verdict);
        }

        if let HistoryMatch::Found { revision } = self
            .history
            .find_in_history(reference, package, &fingerprint)
            .await
        {
            info!("{} is in {} (rev {})", package, reference, revision);
            return Ok((Verdict::Accept, CheckReason::InHistory { revision }));
        }

        let verdict = match self
            .pending
            .find_pending(reference, package, &fingerprint, Some(request_id))
            .await?
        {
            PendingMatch::Safe { request } => {
                info!("{} already reviewed for {}", package, reference);
                (Verdict::Accept, CheckReason::PendingAccepted { request })
            }
            PendingMatch::StillPending { request } => {
                (Verdict::Ignore, CheckReason::PendingInReview { request })
            }
            PendingMatch::Absent => (Verdict::Decline, CheckReason::NotInReference),
        };
        Ok(verdict)
    }

    /// Compare with the reference head. `None` means "keep looking".
    async fn check_reference(
        &self,
        reference: &str,
        package: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Option<(Verdict, CheckReason)>, ServiceError> {
        debug!("checking {} in {}", package, reference);
        match self.resolver.fingerprint(reference, package, None).await? {
            None => {
                debug!("new package");
                Ok(Some((Verdict::Ignore, CheckReason::NewPackage)))
            }
            Some(head) if &head == fingerprint => {
                info!("{} is in {}", package, reference);
                Ok(Some((Verdict::Accept, CheckReason::InReference)))
            }
            Some(_) => {
                debug!("{} not the latest version, checking history", fingerprint.short());
                Ok(None)
            }
        }
    }
}

fn unsupported(kind: &str) -> CheckPlan {
    error!("unhandled request type {}", kind);
    CheckPlan::Decided {
        package: None,
        verdict: Verdict::Ignore,
        reason: CheckReason::Unsupported {
            kind: kind.to_string(),
        },
    }
}

fn incomplete() -> CheckPlan {
    error!("action is missing its source or target");
    CheckPlan::Decided {
        package: None,
        verdict: Verdict::Ignore,
        reason: CheckReason::IncompleteAction,
    }
}
