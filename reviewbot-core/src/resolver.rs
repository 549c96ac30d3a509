//! Source identity resolution: fingerprints and link targets.

use tracing::debug;

use crate::error::ServiceError;
use crate::model::{Fingerprint, LinkTarget};
use crate::service::BuildService;

/// Maximum number of link hops followed when resolving a release package:
/// one same-project hop, then the cross-project link.
pub const MAX_LINK_HOPS: usize = 2;

/// Result of resolving the package a maintenance release forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseTarget {
    /// The package is a cross-project link into the expected project.
    Linked { package: String },
    /// The package carries no link at all.
    NotALink { package: String },
    /// The package links into a different project than expected.
    WrongProject { package: String, project: String },
    /// Same-project links kept forwarding past the hop limit.
    TooDeep { package: String },
}

pub struct SourceResolver<'a> {
    service: &'a dyn BuildService,
}

impl<'a> SourceResolver<'a> {
    pub fn new(service: &'a dyn BuildService) -> Self {
        Self { service }
    }

    /// Fingerprint of a package, `None` when the package does not exist.
    pub async fn fingerprint(
        &self,
        project: &str,
        package: &str,
        revision: Option<&str>,
    ) -> Result<Option<Fingerprint>, ServiceError> {
        let fingerprint = self.service.fingerprint(project, package, revision).await?;
        debug!(
            "{}/{}@{}: {}",
            project,
            package,
            revision.unwrap_or("head"),
            fingerprint
                .as_ref()
                .map(|fp| fp.0.as_str())
                .unwrap_or("not found")
        );
        Ok(fingerprint)
    }

    /// Where a package links to, `None` if it is not a link.
    pub async fn resolve_link(
        &self,
        project: &str,
        package: &str,
    ) -> Result<Option<LinkTarget>, ServiceError> {
        self.service.link_target(project, package).await
    }

    /// Name of the linked package when the link stays inside `project`.
    pub async fn resolve_self_link(
        &self,
        project: &str,
        package: &str,
    ) -> Result<Option<String>, ServiceError> {
        Ok(self
            .resolve_link(project, package)
            .await?
            .filter(|link| link.project == project)
            .map(|link| link.package))
    }

    /// See through same-project links of a package in a maintenance project,
    /// then check that the cross-project link lands in `expected_project`.
    pub async fn resolve_release_target(
        &self,
        project: &str,
        package: &str,
        expected_project: &str,
    ) -> Result<ReleaseTarget, ServiceError> {
        let mut current = package.to_string();

        for _ in 1..MAX_LINK_HOPS {
            let Some(next) = self.resolve_self_link(project, &current).await? else {
                break;
            };
            debug!("{}/{} links to {} in the same project", project, current, next);
            current = next;
        }

        let Some(link) = self.resolve_link(project, &current).await? else {
            return Ok(ReleaseTarget::NotALink { package: current });
        };

        if link.project == project {
            return Ok(ReleaseTarget::TooDeep {
                package: link.package,
            });
        }

        if link.project == expected_project {
            return Ok(ReleaseTarget::Linked {
                package: link.package,
            });
        }

        Ok(ReleaseTarget::WrongProject {
            package: current,
            project: link.project,
        })
    }
}
