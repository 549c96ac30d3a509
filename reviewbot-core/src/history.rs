//! Bounded search of a package's recent revisions for a fingerprint.

use tracing::{debug, warn};

use crate::model::Fingerprint;
use crate::service::BuildService;

/// Number of revisions searched when none is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryMatch {
    /// The fingerprint was found at `revision`.
    Found { revision: String },
    /// The history was searched and does not contain the fingerprint.
    NotFound,
    /// The package has no retrievable history.
    NoHistory,
}

pub struct HistoryScanner<'a> {
    service: &'a dyn BuildService,
    limit: usize,
}

impl<'a> HistoryScanner<'a> {
    pub fn new(service: &'a dyn BuildService, limit: usize) -> Self {
        Self { service, limit }
    }

    /// Look for `fingerprint` among the most recent revisions of a package.
    ///
    /// A failed history read is reported as `NoHistory`: the history is
    /// optional metadata and never decides a request on its own.
    pub async fn find_in_history(
        &self,
        project: &str,
        package: &str,
        fingerprint: &Fingerprint,
    ) -> HistoryMatch {
        let entries = match self.service.history(project, package, self.limit).await {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!("{}/{} has no history", project, package);
                return HistoryMatch::NoHistory;
            }
            Err(e) => {
                warn!("Could not read history of {}/{}: {}", project, package, e);
                return HistoryMatch::NoHistory;
            }
        };

        for entry in entries.iter().take(self.limit) {
            let Some(candidate) = &entry.fingerprint else {
                continue;
            };
            debug!("checking rev {}: {}", entry.revision, candidate);
            if candidate == fingerprint {
                debug!("got it, rev {}", entry.revision);
                return HistoryMatch::Found {
                    revision: entry.revision.clone(),
                };
            }
        }

        debug!("{} not found in history either", fingerprint.short());
        HistoryMatch::NotFound
    }
}
