//! Requirements-gathering phase state machine
//!
//! A project moves through five gathering phases and then into the terminal
//! `Completed` state:
//! Foundation → Features & User Stories → Functional Requirements →
//! Non-Functional Requirements → Technical Context → Completed
//!
//! Transitions only ever move one step forward. The variant order is the
//! phase order, so `Ord` on [`Phase`] is the progression order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requirements-gathering phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Core purpose, target users, main goals
    #[default]
    #[serde(rename = "Foundation")]
    Foundation,
    /// Key features and user stories
    #[serde(rename = "Features & User Stories")]
    Features,
    /// Specific system behaviour
    #[serde(rename = "Functional Requirements")]
    FunctionalRequirements,
    /// Performance, security, usability constraints
    #[serde(rename = "Non-Functional Requirements")]
    NonFunctionalRequirements,
    /// Tech stack and development environment
    #[serde(rename = "Technical Context")]
    TechnicalContext,
    /// All phases gathered
    #[serde(rename = "Completed")]
    Completed,
}

/// Outcome of asking the state machine to advance a stored phase value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseAdvance {
    /// Moved one step forward; the caller commits `to`
    Advanced { from: Phase, to: Phase },
    /// Already terminal, nothing to do
    AlreadyCompleted,
    /// Stored value is not a known phase; nothing to do
    Unrecognized(String),
}

impl Phase {
    /// Every phase in progression order
    pub const ALL: [Phase; 6] = [
        Phase::Foundation,
        Phase::Features,
        Phase::FunctionalRequirements,
        Phase::NonFunctionalRequirements,
        Phase::TechnicalContext,
        Phase::Completed,
    ];

    /// Display name, also the stored and serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Foundation => "Foundation",
            Phase::Features => "Features & User Stories",
            Phase::FunctionalRequirements => "Functional Requirements",
            Phase::NonFunctionalRequirements => "Non-Functional Requirements",
            Phase::TechnicalContext => "Technical Context",
            Phase::Completed => "Completed",
        }
    }

    /// The phase that follows this one, `None` once completed
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Foundation => Some(Phase::Features),
            Phase::Features => Some(Phase::FunctionalRequirements),
            Phase::FunctionalRequirements => Some(Phase::NonFunctionalRequirements),
            Phase::NonFunctionalRequirements => Some(Phase::TechnicalContext),
            Phase::TechnicalContext => Some(Phase::Completed),
            Phase::Completed => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for strings that name no phase
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// Compute the transition for a stored phase value
///
/// Pure and infallible: unknown values and the terminal phase are reported as
/// no-ops rather than errors. Committing the new phase is the caller's job.
pub fn advance(current: &str) -> PhaseAdvance {
    match current.parse::<Phase>() {
        Ok(from) => match from.next() {
            Some(to) => PhaseAdvance::Advanced { from, to },
            None => PhaseAdvance::AlreadyCompleted,
        },
        Err(UnknownPhase(value)) => {
            tracing::warn!(phase = %value, "Cannot advance unrecognized phase");
            PhaseAdvance::Unrecognized(value)
        }
    }
}
