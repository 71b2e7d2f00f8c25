use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to a proposal service, before the lifecycle interprets
/// the acknowledgement.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

/// Which half of the create-then-respond transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Create,
    Respond,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Respond => f.write_str("respond"),
        }
    }
}

/// Why a `submit_decision` attempt was abandoned. None of these change the
/// session state; they exist for logs and diagnostics.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{step} call failed: {source}")]
    Service {
        step: Step,
        #[source]
        source: ServiceError,
    },
    #[error("service reported failure for {step}")]
    Rejected { step: Step },
    #[error("service acknowledged create without a proposal id")]
    MissingProposalId,
    #[error("{step} call timed out after {after:?}")]
    TimedOut { step: Step, after: Duration },
}

impl LifecycleError {
    pub fn step(&self) -> Step {
        match self {
            Self::Service { step, .. } | Self::Rejected { step } | Self::TimedOut { step, .. } => *step,
            Self::MissingProposalId => Step::Create,
        }
    }
}
