use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Decision, ProposalState};

// -- Create --

/// Acknowledgement for `POST /api/proposals`. `proposal_id` is only
/// meaningful when `success` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProposalResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// -- Respond --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondRequest {
    pub proposal_id: String,
    pub response: Decision,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

// -- Status --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalStatusResponse {
    pub proposal_id: String,
    pub status: ProposalState,
    pub response: Option<Decision>,
    pub response_message: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}
