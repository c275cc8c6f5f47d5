//! Meter session state machine

use ekm_core::{EkmError, EkmResult};

/// Meter session state
///
/// # State Transitions
/// ```text
/// Idle -> Opened (open response validated)
/// Opened -> Authenticated (password acknowledged)
/// Opened | Authenticated -> Idle (close, or a failed open)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No meter is selected
    #[default]
    Idle,
    /// A meter answered the open command; reads are allowed
    Opened,
    /// The password was accepted; writes are allowed
    Authenticated,
}

impl SessionState {
    /// Check if a meter is selected
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    /// Check if write commands may be sent
    pub fn can_write(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// Validate state transition
    ///
    /// # Valid Transitions
    /// - `Idle` -> `Opened`
    /// - `Opened` -> `Authenticated`
    /// - any -> `Idle`
    pub fn validate_transition(&self, new_state: SessionState) -> EkmResult<()> {
        let valid = match (*self, new_state) {
            (SessionState::Idle, SessionState::Opened) => true,
            (SessionState::Opened, SessionState::Authenticated) => true,
            (_, SessionState::Idle) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(EkmError::InvalidState(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Opened => "Opened",
            SessionState::Authenticated => "Authenticated",
        }
    }
}
