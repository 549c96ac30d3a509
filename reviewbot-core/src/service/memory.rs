//! In-memory implementation of `BuildService`.
//!
//! Holds packages, histories, links and requests in maps. Mutations are applied
//! to the stored requests and also recorded, so tests can assert on exactly
//! what the engine changed.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BuildService, PackageOwner};
use crate::error::ServiceError;
use crate::model::{
    ActionKind, Fingerprint, HistoryEntry, LinkTarget, Request, RequestId, RequestState, Review,
    ReviewState, ReviewerTarget,
};

#[derive(Debug, Clone, Default)]
struct PackageRecord {
    head: Option<Fingerprint>,
    revisions: HashMap<String, Fingerprint>,
    link: Option<LinkTarget>,
    /// Newest first.
    history: Option<Vec<HistoryEntry>>,
}

/// A review state change submitted through the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewChange {
    pub id: RequestId,
    pub reviewer: String,
    pub state: ReviewState,
    pub message: String,
}

#[derive(Debug, Default)]
struct Mutations {
    review_changes: Vec<ReviewChange>,
    added_reviews: Vec<(RequestId, ReviewerTarget, String)>,
}

/// In-memory build service.
///
/// Projects registered with [`InMemoryBuildService::fail_project`] answer every
/// lookup with a transport error.
#[derive(Default)]
pub struct InMemoryBuildService {
    packages: RwLock<HashMap<(String, String), PackageRecord>>,
    requests: RwLock<BTreeMap<RequestId, Request>>,
    owners: RwLock<HashMap<String, Vec<PackageOwner>>>,
    failing_projects: RwLock<HashSet<String>>,
    rejected_requests: RwLock<HashSet<RequestId>>,
    mutations: RwLock<Mutations>,
}

impl InMemoryBuildService {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, project: &str, package: &str) -> &mut PackageRecord {
        self.packages
            .get_mut()
            .entry((project.to_string(), package.to_string()))
            .or_default()
    }

    /// Register a package whose head has `fingerprint`.
    pub fn with_package(mut self, project: &str, package: &str, fingerprint: &str) -> Self {
        self.record(project, package).head = Some(Fingerprint::from(fingerprint));
        self
    }

    /// Register a fingerprint for a specific revision of a package.
    pub fn with_revision(
        mut self,
        project: &str,
        package: &str,
        revision: &str,
        fingerprint: &str,
    ) -> Self {
        self.record(project, package)
            .revisions
            .insert(revision.to_string(), Fingerprint::from(fingerprint));
        self
    }

    /// Make `package` a link to `target_project`/`target_package`.
    pub fn with_link(
        mut self,
        project: &str,
        package: &str,
        target_project: &str,
        target_package: &str,
    ) -> Self {
        self.record(project, package).link = Some(LinkTarget::new(target_project, target_package));
        self
    }

    /// Set the revision history, given newest first as `(revision, fingerprint)`.
    pub fn with_history(mut self, project: &str, package: &str, entries: &[(&str, &str)]) -> Self {
        self.record(project, package).history = Some(
            entries
                .iter()
                .map(|(rev, fp)| HistoryEntry {
                    revision: rev.to_string(),
                    fingerprint: Some(Fingerprint::from(*fp)),
                })
                .collect(),
        );
        self
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.requests.get_mut().insert(request.id.clone(), request);
        self
    }

    pub fn with_owner(mut self, package: &str, owner: PackageOwner) -> Self {
        self.owners
            .get_mut()
            .entry(package.to_string())
            .or_default()
            .push(owner);
        self
    }

    /// Every lookup touching `project` fails with a transport error.
    pub fn fail_project(mut self, project: &str) -> Self {
        self.failing_projects.get_mut().insert(project.to_string());
        self
    }

    /// Review mutations on request `id` are refused by the service.
    pub fn reject_mutations_for(mut self, id: &str) -> Self {
        self.rejected_requests.get_mut().insert(RequestId::from(id));
        self
    }

    /// Review state changes submitted so far, in order.
    pub async fn review_changes(&self) -> Vec<ReviewChange> {
        self.mutations.read().await.review_changes.clone()
    }

    /// Reviews added so far, in order.
    pub async fn added_reviews(&self) -> Vec<(RequestId, ReviewerTarget, String)> {
        self.mutations.read().await.added_reviews.clone()
    }

    async fn check_project(
        &self,
        operation: &'static str,
        project: &str,
    ) -> Result<(), ServiceError> {
        if self.failing_projects.read().await.contains(project) {
            return Err(ServiceError::transport(
                operation,
                format!("project {} unavailable", project),
            ));
        }
        Ok(())
    }

    async fn check_mutation(
        &self,
        operation: &'static str,
        id: &RequestId,
    ) -> Result<(), ServiceError> {
        if self.rejected_requests.read().await.contains(id) {
            return Err(ServiceError::rejected(
                operation,
                400,
                format!("request {} refused the change", id),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildService for InMemoryBuildService {
    async fn fingerprint(
        &self,
        project: &str,
        package: &str,
        revision: Option<&str>,
    ) -> Result<Option<Fingerprint>, ServiceError> {
        self.check_project("source info", project).await?;
        let packages = self.packages.read().await;
        let Some(record) = packages.get(&(project.to_string(), package.to_string())) else {
            return Ok(None);
        };
        Ok(match revision {
            Some(rev) => record.revisions.get(rev).cloned(),
            None => record.head.clone(),
        })
    }

    async fn link_target(
        &self,
        project: &str,
        package: &str,
    ) -> Result<Option<LinkTarget>, ServiceError> {
        self.check_project("source listing", project).await?;
        let packages = self.packages.read().await;
        Ok(packages
            .get(&(project.to_string(), package.to_string()))
            .and_then(|record| record.link.clone()))
    }

    async fn history(
        &self,
        project: &str,
        package: &str,
        limit: usize,
    ) -> Result<Option<Vec<HistoryEntry>>, ServiceError> {
        self.check_project("history", project).await?;
        let packages = self.packages.read().await;
        Ok(packages
            .get(&(project.to_string(), package.to_string()))
            .and_then(|record| record.history.as_ref())
            .map(|entries| entries.iter().take(limit).cloned().collect()))
    }

    async fn open_requests(
        &self,
        project: &str,
        package: &str,
        states: &[RequestState],
        kind: &ActionKind,
    ) -> Result<Vec<Request>, ServiceError> {
        self.check_project("request list", project).await?;
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|request| states.contains(&request.state))
            .filter(|request| {
                request.actions.iter().any(|action| {
                    &action.kind == kind
                        && action.target_project.as_deref() == Some(project)
                        && action.target_package.as_deref() == Some(package)
                })
            })
            .cloned()
            .collect())
    }

    async fn request(&self, id: &RequestId) -> Result<Option<Request>, ServiceError> {
        Ok(self.requests.read().await.get(id).cloned())
    }

    async fn requests_awaiting_review(&self, reviewer: &str) -> Result<Vec<Request>, ServiceError> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|request| request.state == RequestState::Review)
            .filter(|request| request.review_state_for_user(reviewer) == Some(ReviewState::New))
            .cloned()
            .collect())
    }

    async fn change_review_state(
        &self,
        id: &RequestId,
        reviewer: &str,
        state: ReviewState,
        message: &str,
    ) -> Result<(), ServiceError> {
        self.check_mutation("change review state", id).await?;

        let mut requests = self.requests.write().await;
        let request = requests.get_mut(id).ok_or_else(|| {
            ServiceError::rejected("change review state", 404, format!("no request {}", id))
        })?;
        let review = request
            .reviews
            .iter_mut()
            .find(|r| matches!(&r.by, ReviewerTarget::User(u) if u == reviewer))
            .ok_or_else(|| {
                ServiceError::rejected(
                    "change review state",
                    403,
                    format!("{} is not a reviewer of {}", reviewer, id),
                )
            })?;
        review.state = state;
        review.message = Some(message.to_string());

        self.mutations
            .write()
            .await
            .review_changes
            .push(ReviewChange {
                id: id.clone(),
                reviewer: reviewer.to_string(),
                state,
                message: message.to_string(),
            });
        Ok(())
    }

    async fn add_review(
        &self,
        id: &RequestId,
        target: &ReviewerTarget,
        message: &str,
    ) -> Result<(), ServiceError> {
        self.check_mutation("add review", id).await?;

        let mut requests = self.requests.write().await;
        let request = requests.get_mut(id).ok_or_else(|| {
            ServiceError::rejected("add review", 404, format!("no request {}", id))
        })?;
        request
            .reviews
            .push(Review::new(target.clone(), ReviewState::New));

        self.mutations
            .write()
            .await
            .added_reviews
            .push((id.clone(), target.clone(), message.to_string()));
        Ok(())
    }

    async fn package_owners(&self, package: &str) -> Result<Vec<PackageOwner>, ServiceError> {
        Ok(self
            .owners
            .read()
            .await
            .get(package)
            .cloned()
            .unwrap_or_default())
    }
}
