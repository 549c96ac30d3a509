//! Domain types for build-service requests and their reviews.
//!
//! These mirror the documents served by the build service, but are our own
//! types so the reconciliation logic never depends on the wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Newtype for a request identifier to prevent mixing with other strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content hash of a package's expanded sources (`verifymd5`).
///
/// Equality of fingerprints is the only criterion for "the same content".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Returns a truncated fingerprint for log lines (first 8 characters).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a link package forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    pub project: String,
    pub package: String,
}

impl LinkTarget {
    pub fn new(project: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            package: package.into(),
        }
    }
}

/// One entry of a package's revision history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub revision: String,
    pub fingerprint: Option<Fingerprint>,
}

/// The kind of an action inside a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Submit,
    Release,
    Incident,
    /// Any action type we do not know how to evaluate, kept verbatim.
    Other(String),
}

impl ActionKind {
    /// Map the build-service action type name onto a kind.
    pub fn from_api_name(name: &str) -> Self {
        match name {
            "submit" => Self::Submit,
            "maintenance_release" => Self::Release,
            "maintenance_incident" => Self::Incident,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn api_name(&self) -> &str {
        match self {
            Self::Submit => "submit",
            Self::Release => "maintenance_release",
            Self::Incident => "maintenance_incident",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

/// A single action of a request: content moving from a source to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub source_project: Option<String>,
    pub source_package: Option<String>,
    pub source_revision: Option<String>,
    pub target_project: Option<String>,
    pub target_package: Option<String>,
    /// Release project tag of maintenance incidents.
    pub target_release_project: Option<String>,
}

impl Action {
    /// An action with only its kind set; fill in the rest with the builders.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            source_project: None,
            source_package: None,
            source_revision: None,
            target_project: None,
            target_package: None,
            target_release_project: None,
        }
    }

    pub fn with_source(
        mut self,
        project: impl Into<String>,
        package: impl Into<String>,
        revision: Option<&str>,
    ) -> Self {
        self.source_project = Some(project.into());
        self.source_package = Some(package.into());
        self.source_revision = revision.map(str::to_string);
        self
    }

    pub fn with_target(mut self, project: impl Into<String>, package: Option<&str>) -> Self {
        self.target_project = Some(project.into());
        self.target_package = package.map(str::to_string);
        self
    }

    pub fn with_release_project(mut self, project: impl Into<String>) -> Self {
        self.target_release_project = Some(project.into());
        self
    }
}

/// Error returned when a state name from the build service is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl fmt::Display for UnknownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown state '{}'", self.0)
    }
}

impl std::error::Error for UnknownState {}

/// State of one reviewer's review on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    New,
    Review,
    Accepted,
    Declined,
    Superseded,
    Revoked,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Review => "review",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Superseded => "superseded",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReviewState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "review" => Ok(Self::Review),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "superseded" => Ok(Self::Superseded),
            "revoked" => Ok(Self::Revoked),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Lifecycle state of the request itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    New,
    Review,
    Accepted,
    Declined,
    Revoked,
    Superseded,
    Deleted,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Review => "review",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Revoked => "revoked",
            Self::Superseded => "superseded",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "review" => Ok(Self::Review),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "revoked" => Ok(Self::Revoked),
            "superseded" => Ok(Self::Superseded),
            "deleted" => Ok(Self::Deleted),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// The party a review is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerTarget {
    User(String),
    Group(String),
    Project(String),
    Package { project: String, package: String },
}

impl fmt::Display for ReviewerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user) => write!(f, "user {}", user),
            Self::Group(group) => write!(f, "group {}", group),
            Self::Project(project) => write!(f, "project {}", project),
            Self::Package { project, package } => write!(f, "package {}/{}", project, package),
        }
    }
}

/// A review entry attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub by: ReviewerTarget,
    pub state: ReviewState,
    pub message: Option<String>,
}

impl Review {
    pub fn new(by: ReviewerTarget, state: ReviewState) -> Self {
        Self {
            by,
            state,
            message: None,
        }
    }
}

/// A request as read from the build service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: RequestId,
    pub creator: Option<String>,
    pub state: RequestState,
    pub actions: Vec<Action>,
    pub reviews: Vec<Review>,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, state: RequestState) -> Self {
        Self {
            id: id.into(),
            creator: None,
            state,
            actions: Vec::new(),
            reviews: Vec::new(),
        }
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_review(mut self, review: Review) -> Self {
        self.reviews.push(review);
        self
    }

    /// State of the first review addressed to `user`, if any.
    pub fn review_state_for_user(&self, user: &str) -> Option<ReviewState> {
        self.reviews
            .iter()
            .find(|r| matches!(&r.by, ReviewerTarget::User(u) if u == user))
            .map(|r| r.state)
    }

    /// Whether a review for exactly this party already exists, in any state.
    pub fn has_reviewer(&self, target: &ReviewerTarget) -> bool {
        self.reviews.iter().any(|r| &r.by == target)
    }

    /// Users that appear as reviewers on this request.
    pub fn reviewing_users(&self) -> impl Iterator<Item = &str> {
        self.reviews.iter().filter_map(|r| match &r.by {
            ReviewerTarget::User(user) => Some(user.as_str()),
            _ => None,
        })
    }
}
