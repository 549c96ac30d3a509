//! Build-service abstraction.
//!
//! This module defines the `BuildService` trait: the only way the
//! reconciliation engine reads source identities, histories and requests, and
//! the only way it mutates reviews. Implementations can talk to the real API
//! or keep everything in memory for tests.

mod memory;

pub use memory::{InMemoryBuildService, ReviewChange};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::model::{
    ActionKind, Fingerprint, HistoryEntry, LinkTarget, Request, RequestId, RequestState,
    ReviewState, ReviewerTarget,
};

/// One entry of an owner search: a devel project (and optionally package)
/// responsible for a binary, with its maintainers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOwner {
    pub project: String,
    pub package: Option<String>,
    pub maintainers: Vec<String>,
}

/// Operations the engine needs from the build service.
///
/// Lookups of things that may legitimately be absent (packages, links,
/// histories, requests) return `Ok(None)` rather than an error.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Content fingerprint of a package, at `revision` or at its head.
    async fn fingerprint(
        &self,
        project: &str,
        package: &str,
        revision: Option<&str>,
    ) -> Result<Option<Fingerprint>, ServiceError>;

    /// Link target of a package, `None` if it is not a link or does not exist.
    async fn link_target(
        &self,
        project: &str,
        package: &str,
    ) -> Result<Option<LinkTarget>, ServiceError>;

    /// The most recent `limit` revisions, `None` if there is no history.
    async fn history(
        &self,
        project: &str,
        package: &str,
        limit: usize,
    ) -> Result<Option<Vec<HistoryEntry>>, ServiceError>;

    /// Requests of `kind` in one of `states` that target `project`/`package`.
    async fn open_requests(
        &self,
        project: &str,
        package: &str,
        states: &[RequestState],
        kind: &ActionKind,
    ) -> Result<Vec<Request>, ServiceError>;

    /// A single request with its actions and reviews.
    async fn request(&self, id: &RequestId) -> Result<Option<Request>, ServiceError>;

    /// Requests in review that carry a `new` review for `reviewer`.
    async fn requests_awaiting_review(&self, reviewer: &str) -> Result<Vec<Request>, ServiceError>;

    /// Change the review of `reviewer` on request `id`.
    async fn change_review_state(
        &self,
        id: &RequestId,
        reviewer: &str,
        state: ReviewState,
        message: &str,
    ) -> Result<(), ServiceError>;

    /// Add a review for `target` to request `id`.
    async fn add_review(
        &self,
        id: &RequestId,
        target: &ReviewerTarget,
        message: &str,
    ) -> Result<(), ServiceError>;

    /// Owners (devel projects and maintainers) of a package.
    async fn package_owners(&self, package: &str) -> Result<Vec<PackageOwner>, ServiceError>;
}
