use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

/// Request shape currently believed to be accepted by the deployed model revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityMode {
    #[default]
    SplitInstruction,
    MergedPrompt,
}

impl CompatibilityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CompatibilityMode::SplitInstruction => "split_instruction",
            CompatibilityMode::MergedPrompt => "merged_prompt",
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            CompatibilityMode::SplitInstruction => 0,
            CompatibilityMode::MergedPrompt => 1,
        }
    }

    fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            CompatibilityMode::SplitInstruction
        } else {
            CompatibilityMode::MergedPrompt
        }
    }
}

impl fmt::Display for CompatibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holder of the current [`CompatibilityMode`].
///
/// Starts at `SplitInstruction` and can only move to `MergedPrompt`. The move is a
/// compare-and-set, so concurrent callers observe exactly one transition.
#[derive(Debug, Default)]
pub struct CompatibilityState {
    mode: AtomicU8,
}

impl CompatibilityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(mode: CompatibilityMode) -> Self {
        Self {
            mode: AtomicU8::new(mode.to_raw()),
        }
    }

    pub fn process() -> Arc<CompatibilityState> {
        static PROCESS: OnceLock<Arc<CompatibilityState>> = OnceLock::new();
        PROCESS
            .get_or_init(|| Arc::new(CompatibilityState::new()))
            .clone()
    }

    pub fn current(&self) -> CompatibilityMode {
        CompatibilityMode::from_raw(self.mode.load(Ordering::Acquire))
    }

    /// Returns `true` only for the caller that performed the transition.
    pub fn downgrade(&self) -> bool {
        self.mode
            .compare_exchange(
                CompatibilityMode::SplitInstruction.to_raw(),
                CompatibilityMode::MergedPrompt.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::{CompatibilityMode, CompatibilityState};

    #[test]
    fn starts_split_and_downgrades_once() {
        let state = CompatibilityState::new();
        assert_eq!(state.current(), CompatibilityMode::SplitInstruction);
        assert!(state.downgrade());
        assert_eq!(state.current(), CompatibilityMode::MergedPrompt);
        assert!(!state.downgrade());
        assert!(!state.downgrade());
        assert_eq!(state.current(), CompatibilityMode::MergedPrompt);
    }

    #[test]
    fn merged_start_never_reports_a_transition() {
        let state = CompatibilityState::starting_at(CompatibilityMode::MergedPrompt);
        assert!(!state.downgrade());
        assert_eq!(state.current(), CompatibilityMode::MergedPrompt);
    }

    #[test]
    fn concurrent_downgrades_transition_exactly_once() {
        let state = Arc::new(CompatibilityState::new());
        let handles = (0..8)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || state.downgrade())
            })
            .collect::<Vec<_>>();
        let transitions = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .filter(|won| *won)
            .count();
        assert_eq!(transitions, 1);
        assert_eq!(state.current(), CompatibilityMode::MergedPrompt);
    }

    #[test]
    fn process_state_is_shared() {
        let first = CompatibilityState::process();
        let second = CompatibilityState::process();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
