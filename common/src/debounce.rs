use core::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    clock::{elapsed_ms, Millis},
    types::Button,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceMode {
    #[default]
    PerButton,
    Shared,
}

/// Edge filter callable from interrupt context.
///
/// An edge is accepted only when strictly more than `window_ms` passed since
/// the last accepted edge in the same slot. Rejected edges are dropped.
#[derive(Debug)]
pub struct Debouncer {
    window_ms: Millis,
    mode: DebounceMode,
    last_accepted: [AtomicU32; 3],
}

impl Debouncer {
    pub const fn new(window_ms: Millis, mode: DebounceMode) -> Self {
        // Start one tick outside the window so the very first edge passes.
        let primed = 0u32.wrapping_sub(window_ms).wrapping_sub(1);
        Self {
            window_ms,
            mode,
            last_accepted: [
                AtomicU32::new(primed),
                AtomicU32::new(primed),
                AtomicU32::new(primed),
            ],
        }
    }

    pub fn accept(&self, button: Button, now_ms: Millis) -> bool {
        let slot = match self.mode {
            DebounceMode::PerButton => &self.last_accepted[button.index()],
            DebounceMode::Shared => &self.last_accepted[0],
        };

        // Check and claim in one CAS so racing handlers cannot both pass.
        let mut last = slot.load(Ordering::Acquire);
        loop {
            if elapsed_ms(now_ms, last, self.window_ms) <= self.window_ms {
                return false;
            }
            match slot.compare_exchange_weak(last, now_ms, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(current) => last = current,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_edge_is_accepted_at_boot() {
        let debouncer = Debouncer::new(200, DebounceMode::PerButton);
        assert!(debouncer.accept(Button::Set, 0));
    }

    #[test]
    fn drops_edges_inside_window() {
        let debouncer = Debouncer::new(200, DebounceMode::PerButton);

        assert!(debouncer.accept(Button::Up, 1_000));
        assert!(!debouncer.accept(Button::Up, 1_050));
        assert!(!debouncer.accept(Button::Up, 1_200));
        assert!(debouncer.accept(Button::Up, 1_201));
    }

    #[test]
    fn rejected_edges_do_not_extend_window() {
        let debouncer = Debouncer::new(200, DebounceMode::PerButton);

        assert!(debouncer.accept(Button::Down, 1_000));
        assert!(!debouncer.accept(Button::Down, 1_150));
        assert!(debouncer.accept(Button::Down, 1_250));
    }

    #[test]
    fn per_button_slots_are_independent() {
        let debouncer = Debouncer::new(200, DebounceMode::PerButton);

        assert!(debouncer.accept(Button::Set, 1_000));
        assert!(debouncer.accept(Button::Up, 1_010));
        assert!(debouncer.accept(Button::Down, 1_020));
        assert!(!debouncer.accept(Button::Set, 1_100));
    }

    #[test]
    fn shared_slot_suppresses_other_buttons() {
        let debouncer = Debouncer::new(200, DebounceMode::Shared);

        assert!(debouncer.accept(Button::Set, 1_000));
        assert!(!debouncer.accept(Button::Up, 1_010));
        assert!(debouncer.accept(Button::Up, 1_300));
    }

    #[test]
    fn stale_stamp_from_preempted_handler_is_rejected() {
        let debouncer = Debouncer::new(200, DebounceMode::Shared);

        assert!(debouncer.accept(Button::Up, 5_001));
        // Handler that read the clock just before being preempted.
        assert!(!debouncer.accept(Button::Down, 5_000));
    }

    #[test]
    fn accepted_edges_are_always_more_than_window_apart() {
        let debouncer = Debouncer::new(200, DebounceMode::PerButton);
        let mut accepted = Vec::new();

        for now in (0..5_000).step_by(37) {
            if debouncer.accept(Button::Set, now) {
                accepted.push(now);
            }
        }

        assert!(accepted.len() > 1);
        assert!(accepted.windows(2).all(|pair| pair[1] - pair[0] > 200));
    }
}
