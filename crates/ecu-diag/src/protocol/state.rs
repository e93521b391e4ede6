//! Driver session state

use parking_lot::RwLock;

use super::ProtocolError;

/// Session state of a protocol driver
///
/// `Idle → SessionActive → Configured → Polling → Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriverState {
    #[default]
    Idle,
    /// Handshake succeeded
    SessionActive,
    /// Dynamic register programmed
    Configured,
    /// At least one register read done
    Polling,
}

/// Lock-guarded driver state with checked transitions
#[derive(Debug, Default)]
pub struct StateCell {
    state: RwLock<DriverState>,
}

impl StateCell {
    pub fn get(&self) -> DriverState {
        *self.state.read()
    }

    pub fn set(&self, state: DriverState) {
        let mut current = self.state.write();
        if *current != state {
            tracing::debug!(from = ?*current, to = ?state, "Driver state change");
            *current = state;
        }
    }

    /// Fail with `InvalidState` unless the current state is one of `allowed`
    pub fn require(
        &self,
        operation: &'static str,
        allowed: &[DriverState],
    ) -> Result<DriverState, ProtocolError> {
        let state = self.get();
        if allowed.contains(&state) {
            Ok(state)
        } else {
            Err(ProtocolError::InvalidState { operation, state })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), DriverState::Idle);
        assert!(cell.require("start", &[DriverState::Idle]).is_ok());

        let err = cell.require("read", &[DriverState::Configured]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidState {
                operation: "read",
                state: DriverState::Idle
            }
        ));

        cell.set(DriverState::Configured);
        assert!(cell
            .require("read", &[DriverState::Configured, DriverState::Polling])
            .is_ok());
    }
}
