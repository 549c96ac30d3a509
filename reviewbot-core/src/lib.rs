//! Source reconciliation for build-service review requests.
//!
//! Decides whether the sources a request moves around are already present, or
//! already on their way, in a reference project, and sets the bot's review on
//! the request accordingly.

pub mod classifier;
pub mod driver;
pub mod engine;
pub mod error;
pub mod history;
pub mod model;
pub mod pending;
pub mod policy;
pub mod resolver;
pub mod service;
pub mod verdict;

pub use classifier::{ActionOutcome, CheckReason, Classification, Classifier, ClassifierConfig};
pub use driver::{ReviewDriver, ReviewMessages, Transition};
pub use engine::{BatchReport, EngineConfig, RequestFailure, RequestOutcome, ReviewEngine};
pub use error::ServiceError;
pub use model::*;
pub use policy::{IncidentPolicyKind, IncidentReviewPolicy, ReviewRequest};
pub use service::{BuildService, InMemoryBuildService, PackageOwner};
pub use verdict::Verdict;
