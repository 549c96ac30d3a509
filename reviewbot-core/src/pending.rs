//! Cross-checks against other open requests carrying the same content.
//!
//! Requests for the same content can race: while one is still being reviewed
//! another may already be on its way in. The scan reads the current state of
//! the sibling requests on every call and keeps nothing between calls.

use tracing::{debug, error};

use crate::error::ServiceError;
use crate::model::{ActionKind, Fingerprint, RequestId, RequestState};
use crate::resolver::SourceResolver;
use crate::service::BuildService;

/// Request states considered "in flight".
pub const OPEN_STATES: [RequestState; 2] = [RequestState::New, RequestState::Review];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMatch {
    /// A matching request is in state `new`, so it is already slated for
    /// acceptance.
    Safe { request: RequestId },
    /// A matching request is itself still under review.
    StillPending { request: RequestId },
    /// No open request carries the fingerprint.
    Absent,
}

pub struct PendingScanner<'a> {
    service: &'a dyn BuildService,
    resolver: SourceResolver<'a>,
}

impl<'a> PendingScanner<'a> {
    pub fn new(service: &'a dyn BuildService) -> Self {
        Self {
            service,
            resolver: SourceResolver::new(service),
        }
    }

    /// Find an open submit request into `project`/`package` whose source has
    /// `fingerprint`. The first matching request decides. `exclude` is the
    /// request under evaluation, which must not vouch for itself.
    pub async fn find_pending(
        &self,
        project: &str,
        package: &str,
        fingerprint: &Fingerprint,
        exclude: Option<&RequestId>,
    ) -> Result<PendingMatch, ServiceError> {
        debug!("checking requests into {}/{}", project, package);
        let requests = self
            .service
            .open_requests(project, package, &OPEN_STATES, &ActionKind::Submit)
            .await?;

        for request in &requests {
            if exclude == Some(&request.id) {
                continue;
            }

            for action in &request.actions {
                if action.target_project.as_deref() != Some(project) {
                    continue;
                }
                if action
                    .target_package
                    .as_deref()
                    .is_some_and(|target| target != package)
                {
                    continue;
                }
                let (Some(src_project), Some(src_package)) =
                    (&action.source_project, &action.source_package)
                else {
                    continue;
                };

                let candidate = self
                    .resolver
                    .fingerprint(src_project, src_package, action.source_revision.as_deref())
                    .await?;
                debug!(
                    "rq {}: {}/{}@{}",
                    request.id,
                    src_project,
                    src_package,
                    candidate
                        .as_ref()
                        .map(|fp| fp.short())
                        .unwrap_or("unknown")
                );

                if candidate.as_ref() != Some(fingerprint) {
                    continue;
                }

                return Ok(match request.state {
                    RequestState::New => {
                        debug!("request {} ok", request.id);
                        PendingMatch::Safe {
                            request: request.id.clone(),
                        }
                    }
                    RequestState::Review => {
                        debug!("request {} still in review", request.id);
                        PendingMatch::StillPending {
                            request: request.id.clone(),
                        }
                    }
                    other => {
                        error!("request {} in state {} not expected", request.id, other);
                        PendingMatch::Absent
                    }
                });
            }
        }

        Ok(PendingMatch::Absent)
    }
}
