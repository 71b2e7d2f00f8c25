//! Proposal lifecycle client.
//!
//! A [`ProposalSession`] owns one user's view of one proposal: it creates the
//! proposal lazily on the first decision, responds against the returned id,
//! and refuses to send anything once a response has been acknowledged.
//! [`ResponseView`] maps a session snapshot to what should be on screen.

pub mod error;
pub mod service;
pub mod session;
pub mod view;

pub use error::{LifecycleError, ServiceError, Step};
pub use service::{HttpProposalService, ProposalService};
pub use session::{
    DEFAULT_REQUEST_TIMEOUT, Phase, ProposalSession, SessionSnapshot, SubmitOutcome,
    decision_message,
};
pub use view::ResponseView;
