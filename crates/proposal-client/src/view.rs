use std::fmt;

use proposal_types::Decision;

use crate::session::SessionSnapshot;

/// What the presentation layer should show for the current session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseView {
    /// Decision controls are shown; they must be disabled while a decision
    /// is in flight.
    AwaitingDecision { controls_enabled: bool },
    /// Shown after a "yes".
    Celebration,
    /// Shown after "I need some time".
    Understanding,
}

impl ResponseView {
    pub fn for_snapshot(snapshot: &SessionSnapshot) -> Self {
        match (snapshot.response_submitted, snapshot.last_decision) {
            (true, Some(Decision::Yes)) => Self::Celebration,
            (true, Some(Decision::No)) => Self::Understanding,
            _ => Self::AwaitingDecision {
                controls_enabled: !snapshot.is_loading,
            },
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Self::AwaitingDecision { .. } => "Will you give me a chance?",
            Self::Celebration => "She said yes! The beginning of our story starts now.",
            Self::Understanding => "I understand. Take all the time you need.",
        }
    }
}

impl fmt::Display for ResponseView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingDecision {
                controls_enabled: false,
            } => write!(f, "{} (sending...)", self.headline()),
            _ => f.write_str(self.headline()),
        }
    }
}
