//! Discovery state transition table

use linkagent_core::ControllerState;

/// Result of running the handler for a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler completed its step
    Success,
    /// The handler failed; retry after backoff
    Failure,
    /// Re-validation found a different pipeline on the device
    PipelineChanged,
}

/// State to move to after the handler for `state` produced `outcome`
pub fn next_state(state: ControllerState, outcome: Outcome) -> ControllerState {
    use ControllerState::*;

    match (state, outcome) {
        (Stopped, _) => Stopped,
        (_, Outcome::Failure) => state,
        (Configured, Outcome::PipelineChanged) => Connected,
        (_, Outcome::PipelineChanged) => state,
        (Disconnected, Outcome::Success) => Connected,
        (Connected, Outcome::Success) => PipelineAvailable,
        (PipelineAvailable, Outcome::Success) => Elected,
        (Elected, Outcome::Success) => PortsDiscovered,
        (PortsDiscovered, Outcome::Success) => Configured,
        (Configured, Outcome::Success) => Configured,
        (Reconfigured, Outcome::Success) => Configured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkagent_core::ControllerState::*;

    #[test]
    fn test_bootstrap_sequence() {
        let mut state = Disconnected;
        let mut visited = vec![state];
        while state != Configured {
            state = next_state(state, Outcome::Success);
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![Disconnected, Connected, PipelineAvailable, Elected, PortsDiscovered, Configured]
        );
        assert_eq!(next_state(Configured, Outcome::Success), Configured);
        assert_eq!(next_state(Reconfigured, Outcome::Success), Configured);
    }

    #[test]
    fn test_failure_stays() {
        let states = [
            Disconnected,
            Connected,
            PipelineAvailable,
            Elected,
            PortsDiscovered,
            Reconfigured,
        ];
        for state in states {
            assert_eq!(next_state(state, Outcome::Failure), state);
        }
    }

    #[test]
    fn test_pipeline_change_rebootstraps() {
        assert_eq!(next_state(Configured, Outcome::PipelineChanged), Connected);
        assert_eq!(next_state(Elected, Outcome::PipelineChanged), Elected);
    }

    #[test]
    fn test_stopped_is_terminal() {
        for outcome in [Outcome::Success, Outcome::Failure, Outcome::PipelineChanged] {
            assert_eq!(next_state(Stopped, outcome), Stopped);
        }
    }
}
