pub mod api;
pub mod models;

pub use models::{Decision, Proposal, ProposalRecord, ProposalState, StoryChapter};
