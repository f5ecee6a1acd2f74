//! Lifecycle of one server call.

use std::sync::RwLock;

use log::warn;

/// Phase of a server call.
///
/// Transitions:
/// - Created -> HeadersPending (implementation started)
/// - Created -> Closed (cancelled before the implementation ran)
/// - HeadersPending -> Streaming (headers sent with the first response)
/// - HeadersPending | Streaming -> Completing (implementation finished)
/// - any -> Closed (transport close, once)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallPhase {
    /// Listener registered, implementation not started
    Created,
    /// Implementation running, nothing sent yet
    HeadersPending,
    /// Headers sent, responses flowing
    Streaming,
    /// Implementation finished, status being computed
    Completing,
    /// Transport call closed (terminal state)
    Closed,
}

impl CallPhase {
    fn can_advance_to(self, next: CallPhase) -> bool {
        use CallPhase::*;
        matches!(
            (self, next),
            (Created, HeadersPending)
                | (HeadersPending, Streaming)
                | (HeadersPending, Completing)
                | (Streaming, Completing)
                | (Created | HeadersPending | Streaming | Completing, Closed)
        )
    }
}

/// Shared, synchronously readable phase of a call.
#[derive(Debug)]
pub(crate) struct PhaseCell {
    phase: RwLock<CallPhase>,
}

impl PhaseCell {
    pub(crate) fn new() -> Self {
        Self {
            phase: RwLock::new(CallPhase::Created),
        }
    }

    pub(crate) fn get(&self) -> CallPhase {
        match self.phase.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!(
                    target: "nagare::lock_recovery",
                    "Recovered from poisoned phase lock in PhaseCell::get()"
                );
                *poisoned.into_inner()
            }
        }
    }

    /// Move to `next` if the transition is allowed. Returns whether it moved.
    pub(crate) fn advance(&self, next: CallPhase) -> bool {
        let mut guard = self.phase.write().unwrap_or_else(|poisoned| {
            warn!(
                target: "nagare::lock_recovery",
                "Recovered from poisoned phase lock in PhaseCell::advance()"
            );
            poisoned.into_inner()
        });
        if guard.can_advance_to(next) {
            *guard = next;
            true
        } else {
            false
        }
    }

    /// Enter `Closed`. True only for the first caller.
    pub(crate) fn close_once(&self) -> bool {
        self.advance(CallPhase::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn normal_lifecycle() {
        let cell = PhaseCell::new();
        assert!(cell.advance(CallPhase::HeadersPending));
        assert!(cell.advance(CallPhase::Streaming));
        assert!(cell.advance(CallPhase::Completing));
        assert!(cell.close_once());
        assert_eq!(cell.get(), CallPhase::Closed);
    }

    #[test]
    fn close_is_once_only() {
        let cell = PhaseCell::new();
        assert!(cell.close_once());
        assert!(!cell.close_once());
        assert!(!cell.advance(CallPhase::HeadersPending));
        assert_eq!(cell.get(), CallPhase::Closed);
    }

    #[rstest]
    #[case(CallPhase::Created, CallPhase::Streaming)]
    #[case(CallPhase::Created, CallPhase::Completing)]
    #[case(CallPhase::Streaming, CallPhase::HeadersPending)]
    #[case(CallPhase::Completing, CallPhase::Streaming)]
    fn rejects_backward_or_skipping_transitions(#[case] from: CallPhase, #[case] to: CallPhase) {
        assert!(!from.can_advance_to(to));
    }

    #[test]
    fn headers_pending_can_complete_without_streaming() {
        let cell = PhaseCell::new();
        cell.advance(CallPhase::HeadersPending);
        assert!(cell.advance(CallPhase::Completing));
    }
}
