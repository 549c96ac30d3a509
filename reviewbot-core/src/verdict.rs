//! Tri-state review verdicts and their reduction across actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of evaluating one action, or a whole request.
///
/// `Ignore` means "no opinion yet" and is distinct from `Decline`: a request
/// left at `Ignore` is evaluated again on a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Decline,
    #[default]
    Ignore,
}

impl Verdict {
    /// Fold the verdict of the next action into the running overall verdict.
    ///
    /// A `Decline` sticks once seen. Otherwise the first non-`Ignore` verdict
    /// wins and later ones cannot replace it.
    pub fn combine(self, next: Verdict) -> Verdict {
        match (self, next) {
            (Verdict::Decline, _) | (_, Verdict::Decline) => Verdict::Decline,
            (Verdict::Ignore, next) => next,
            (current, _) => current,
        }
    }

    /// Reduce per-action verdicts into the overall verdict of a request.
    pub fn reduce<I>(verdicts: I) -> Verdict
    where
        I: IntoIterator<Item = Verdict>,
    {
        verdicts
            .into_iter()
            .fold(Verdict::Ignore, |overall, next| overall.combine(next))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::Decline => "decline",
            Verdict::Ignore => "ignore",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
