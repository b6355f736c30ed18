use core::sync::atomic::{AtomicU32, Ordering};

use heapless::mpmc::MpMcQueue;

use crate::{
    clock::Millis,
    debounce::{DebounceMode, Debouncer},
    types::{Button, ButtonEvent},
};

pub const INBOX_CAPACITY: usize = 16;

/// Hand-off from the button interrupt handlers to the control loop.
///
/// `on_edge` only touches atomics and a lock-free queue, so it is safe to
/// call from an ISR. The loop is the only consumer.
pub struct ButtonInbox {
    debouncer: Debouncer,
    queue: MpMcQueue<ButtonEvent, INBOX_CAPACITY>,
    dropped: AtomicU32,
}

impl ButtonInbox {
    pub const fn new(debounce_ms: Millis, mode: DebounceMode) -> Self {
        Self {
            debouncer: Debouncer::new(debounce_ms, mode),
            queue: MpMcQueue::new(),
            dropped: AtomicU32::new(0),
        }
    }

    pub fn on_edge(&self, button: Button, now_ms: Millis) -> bool {
        if !self.debouncer.accept(button, now_ms) {
            return false;
        }

        if self.queue.enqueue(ButtonEvent::new(button, now_ms)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn drain(&self) -> impl Iterator<Item = ButtonEvent> + '_ {
        core::iter::from_fn(move || self.queue.dequeue())
    }

    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}
