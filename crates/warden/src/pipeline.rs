//! Request pipeline states.
//!
//! ```text
//! Received → TimeChecked → GeoChecked → PermissionsResolved → FilterBuilt → ResultsChecked → Allowed ─┐
//!     │            │            │                │                  │              │                  ├→ Logged
//!     └────────────┴────────────┴────────────────┴──────────────────┴──────────────┴─────→ Denied ─────┘
//! ```

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Received,
    TimeChecked,
    GeoChecked,
    PermissionsResolved,
    FilterBuilt,
    ResultsChecked,
    Allowed,
    Denied,
    Logged,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Allowed | PipelineState::Denied)
    }

    /// The forward step on the success path, if any.
    fn next_on_success(self) -> Option<PipelineState> {
        use PipelineState::{
            Allowed, FilterBuilt, GeoChecked, PermissionsResolved, Received, ResultsChecked, TimeChecked,
        };
        match self {
            Received => Some(TimeChecked),
            TimeChecked => Some(GeoChecked),
            GeoChecked => Some(PermissionsResolved),
            PermissionsResolved => Some(FilterBuilt),
            FilterBuilt => Some(ResultsChecked),
            ResultsChecked => Some(Allowed),
            _ => None,
        }
    }

    pub fn can_advance_to(self, next: PipelineState) -> bool {
        match next {
            PipelineState::Denied => !self.is_terminal() && self != PipelineState::Logged,
            PipelineState::Logged => self.is_terminal(),
            _ => self.next_on_success() == Some(next),
        }
    }
}

/// States visited by one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTrace {
    states: Vec<PipelineState>,
}

impl StateTrace {
    pub fn new() -> Self {
        Self {
            states: vec![PipelineState::Received],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    pub fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        debug_assert!(
            current.can_advance_to(next),
            "invalid pipeline transition {current:?} -> {next:?}"
        );
        debug!(from = ?current, to = ?next, "pipeline transition");
        self.states.push(next);
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn into_states(self) -> Vec<PipelineState> {
        self.states
    }
}

impl Default for StateTrace {
    fn default() -> Self {
        Self::new()
    }
}
