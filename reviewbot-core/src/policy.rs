//! Additional reviewers for maintenance incidents.
//!
//! Two policies exist. `Fixed` relies solely on the secondary reviewer that
//! the classifier routes sentinel-tagged incidents to. `Maintainers` also asks
//! the devel project of the package to review when neither the creator of the
//! request nor any of its reviewers maintains the package.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::model::{Action, Request, ReviewerTarget};
use crate::service::BuildService;

pub const DEVEL_REVIEW_MESSAGE: &str =
    "Submission by someone who is not maintainer in the devel project. Please review";

/// A review the engine should add to a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReviewRequest {
    pub target: ReviewerTarget,
    pub message: String,
}

/// Hook deciding which extra reviewers an incident action needs.
#[async_trait]
pub trait IncidentReviewPolicy: Send + Sync {
    async fn extra_reviews(
        &self,
        service: &dyn BuildService,
        request: &Request,
        action: &Action,
    ) -> Result<Vec<ReviewRequest>, ServiceError>;
}

/// Only the sentinel-driven secondary reviewer.
pub struct FixedReviewerPolicy;

#[async_trait]
impl IncidentReviewPolicy for FixedReviewerPolicy {
    async fn extra_reviews(
        &self,
        _service: &dyn BuildService,
        _request: &Request,
        _action: &Action,
    ) -> Result<Vec<ReviewRequest>, ServiceError> {
        Ok(Vec::new())
    }
}

/// Devel project reviews for incidents not submitted by a maintainer.
pub struct MaintainerReviewPolicy;

#[async_trait]
impl IncidentReviewPolicy for MaintainerReviewPolicy {
    async fn extra_reviews(
        &self,
        service: &dyn BuildService,
        request: &Request,
        action: &Action,
    ) -> Result<Vec<ReviewRequest>, ServiceError> {
        let (Some(src_project), Some(src_package)) =
            (&action.source_project, &action.source_package)
        else {
            return Ok(Vec::new());
        };

        // Incident packages are often named like "vim.openSUSE_13.2_Update";
        // the link leads to the real package name.
        let package = match service.link_target(src_project, src_package).await? {
            Some(link) => link.package,
            None => src_package.clone(),
        };

        let owners = service.package_owners(&package).await?;
        let maintainers: BTreeSet<&str> = owners
            .iter()
            .flat_map(|owner| owner.maintainers.iter().map(String::as_str))
            .collect();

        if maintainers.is_empty() {
            warn!("{} doesn't have maintainers", package);
            return Ok(Vec::new());
        }

        if let Some(author) = request.creator.as_deref() {
            if maintainers.contains(author) {
                debug!("{} is maintainer", author);
                return Ok(Vec::new());
            }
        }

        if let Some(reviewer) = request
            .reviewing_users()
            .find(|user| maintainers.contains(user))
        {
            debug!("found {} as reviewer", reviewer);
            return Ok(Vec::new());
        }

        info!(
            "author: {}, maintainers: {} => need review",
            request.creator.as_deref().unwrap_or("unknown"),
            maintainers.iter().copied().collect::<Vec<_>>().join(",")
        );

        Ok(owners
            .iter()
            .map(|owner| ReviewRequest {
                target: match &owner.package {
                    Some(package) => ReviewerTarget::Package {
                        project: owner.project.clone(),
                        package: package.clone(),
                    },
                    None => ReviewerTarget::Project(owner.project.clone()),
                },
                message: DEVEL_REVIEW_MESSAGE.to_string(),
            })
            .collect())
    }
}

/// Selects one of the incident review policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentPolicyKind {
    #[default]
    Fixed,
    Maintainers,
}

impl IncidentPolicyKind {
    pub fn build(self) -> Box<dyn IncidentReviewPolicy> {
        match self {
            Self::Fixed => Box::new(FixedReviewerPolicy),
            Self::Maintainers => Box::new(MaintainerReviewPolicy),
        }
    }
}

impl fmt::Display for IncidentPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Maintainers => write!(f, "maintainers"),
        }
    }
}

impl FromStr for IncidentPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "maintainers" => Ok(Self::Maintainers),
            other => Err(format!("unknown incident policy '{}'", other)),
        }
    }
}
