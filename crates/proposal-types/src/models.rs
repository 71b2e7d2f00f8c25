use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One chapter of the couple's story, rendered in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryChapter {
    pub date: String,
    pub description: String,
}

/// The proposal payload. The client never mutates it once loaded; the
/// service assigns the identifier on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub partner_name: String,
    pub proposer_name: String,
    pub message: String,
    #[serde(default)]
    pub our_story: Vec<StoryChapter>,
}

/// The recipient's answer. `No` means "I need some time", not a refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Decision {
    Yes,
    No,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

impl FromStr for Decision {
    type Err = UnknownVariant;

    /// Case-insensitive, so `"YES"` from an older client still counts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl TryFrom<String> for Decision {
    type Error = UnknownVariant;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Server-side status of a stored proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalState {
    #[default]
    Pending,
    Responded,
}

impl FromStr for ProposalState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// A proposal as stored by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: String,
    #[serde(flatten)]
    pub proposal: Proposal,
    pub created_at: DateTime<Utc>,
    pub status: ProposalState,
    /// Latest response recorded against this proposal, if any.
    pub response: Option<Decision>,
}
