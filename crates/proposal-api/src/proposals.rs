use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use proposal_db::models::{NewProposal, ProposalRow, ResponseRow};
use proposal_types::api::{
    CreateProposalResponse, ProposalStatusResponse, RespondRequest, RespondResponse,
};
use proposal_types::{Decision, Proposal, ProposalRecord, ProposalState, StoryChapter};

use crate::{AppState, run_db};

/// POST /api/proposals: store the proposal and hand back its new id.
pub async fn create_proposal(
    State(state): State<AppState>,
    Json(proposal): Json<Proposal>,
) -> Result<impl IntoResponse, StatusCode> {
    let proposal_id = Uuid::new_v4().to_string();
    let our_story = serde_json::to_string(&proposal.our_story).map_err(|e| {
        warn!("Failed to encode our_story: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let id = proposal_id.clone();
    let partner_name = proposal.partner_name.clone();
    run_db(&state, move |db| {
        db.insert_proposal(&NewProposal {
            id: &id,
            partner_name: &proposal.partner_name,
            proposer_name: &proposal.proposer_name,
            message: &proposal.message,
            our_story: &our_story,
        })
    })
    .await?;

    info!(proposal_id = %proposal_id, partner = %partner_name, "Proposal created");

    Ok(Json(CreateProposalResponse {
        success: true,
        proposal_id: Some(proposal_id),
        message: Some("Proposal created successfully!".into()),
    }))
}

/// GET /api/proposals/{proposal_id}
pub async fn get_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = run_db(&state, move |db| db.get_proposal(&proposal_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(record_from_row(row)))
}

/// POST /api/proposals/{proposal_id}/respond
///
/// The path id is authoritative; a body naming a different proposal is
/// rejected rather than silently re-targeted.
pub async fn respond_to_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.proposal_id != proposal_id {
        warn!(
            "Response body names proposal '{}' but path names '{}'",
            req.proposal_id, proposal_id
        );
        return Err(StatusCode::BAD_REQUEST);
    }

    let response_id = Uuid::new_v4().to_string();
    let decision = req.response;

    let rid = response_id.clone();
    let pid = proposal_id.clone();
    let recorded = run_db(&state, move |db| {
        db.record_response(&rid, &pid, decision.as_str(), &req.message)
    })
    .await?;

    if !recorded {
        return Err(StatusCode::NOT_FOUND);
    }

    info!(proposal_id = %proposal_id, response = %decision, "Response recorded");

    Ok(Json(RespondResponse {
        success: true,
        message: Some(format!("Response '{}' recorded successfully!", decision)),
        response_id: Some(response_id),
    }))
}

/// GET /api/proposals/{proposal_id}/status
pub async fn get_proposal_status(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let pid = proposal_id.clone();
    let (row, latest) = run_db(&state, move |db| {
        let Some(row) = db.get_proposal(&pid)? else {
            return Ok(None);
        };
        let latest = db.latest_response(&pid)?;
        Ok(Some((row, latest)))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(status_from_rows(proposal_id, &row, latest)))
}

fn record_from_row(row: ProposalRow) -> ProposalRecord {
    let our_story: Vec<StoryChapter> = serde_json::from_str(&row.our_story).unwrap_or_else(|e| {
        warn!("Corrupt our_story on proposal '{}': {}", row.id, e);
        Vec::new()
    });

    ProposalRecord {
        status: parse_state(&row),
        response: row.response.as_deref().and_then(|r| parse_decision(&row.id, r)),
        created_at: parse_timestamp(&row.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on proposal '{}'", row.created_at, row.id);
            DateTime::default()
        }),
        proposal: Proposal {
            partner_name: row.partner_name,
            proposer_name: row.proposer_name,
            message: row.message,
            our_story,
        },
        id: row.id,
    }
}

fn status_from_rows(
    proposal_id: String,
    row: &ProposalRow,
    latest: Option<ResponseRow>,
) -> ProposalStatusResponse {
    let (response_message, responded_at) = match latest {
        Some(r) => (Some(r.message), parse_timestamp(&r.responded_at)),
        None => (None, None),
    };

    ProposalStatusResponse {
        proposal_id,
        status: parse_state(row),
        response: row.response.as_deref().and_then(|r| parse_decision(&row.id, r)),
        response_message,
        responded_at,
    }
}

fn parse_state(row: &ProposalRow) -> ProposalState {
    row.status.parse().unwrap_or_else(|e| {
        warn!("Corrupt status on proposal '{}': {}", row.id, e);
        ProposalState::Pending
    })
}

fn parse_decision(proposal_id: &str, raw: &str) -> Option<Decision> {
    raw.parse()
        .inspect_err(|e| warn!("Corrupt response on proposal '{}': {}", proposal_id, e))
        .ok()
}

/// SQLite's `datetime('now')` has no timezone ("YYYY-MM-DD HH:MM:SS"); it is UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}
