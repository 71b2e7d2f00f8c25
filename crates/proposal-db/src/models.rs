//! Database row types, mapped straight from SQLite rows.
//! Kept apart from the proposal-types models so the store has no serde
//! dependency; `our_story` stays as the JSON text it was stored as.

pub struct ProposalRow {
    pub id: String,
    pub partner_name: String,
    pub proposer_name: String,
    pub message: String,
    pub our_story: String,
    pub status: String,
    pub response: Option<String>,
    pub created_at: String,
}

pub struct ResponseRow {
    pub id: String,
    pub proposal_id: String,
    pub response: String,
    pub message: String,
    pub responded_at: String,
}

/// Insert payload for a new proposal.
pub struct NewProposal<'a> {
    pub id: &'a str,
    pub partner_name: &'a str,
    pub proposer_name: &'a str,
    pub message: &'a str,
    pub our_story: &'a str,
}
