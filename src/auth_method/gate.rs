use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot latch separating the initial credential delivery from later refreshes.
///
/// Starts closed and opens at most once; further `open` calls are no-ops.
#[derive(Debug, Default)]
pub(crate) struct SignalGate {
    open: AtomicBool,
}

impl SignalGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opens the gate. Returns `true` only for the call that performed the transition.
    pub(crate) fn open(&self) -> bool {
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_closed_and_opens_once() {
        let gate = SignalGate::new();
        assert!(!gate.is_open());
        assert!(gate.open());
        assert!(gate.is_open());
        assert!(!gate.open());
        assert!(gate.is_open());
    }

    #[test]
    fn test_concurrent_open_has_a_single_winner() {
        let gate = Arc::new(SignalGate::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.open())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(gate.is_open());
    }
}
