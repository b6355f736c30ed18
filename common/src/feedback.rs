use crate::clock::{elapsed_ms, Millis};

#[derive(Debug, Clone)]
pub struct ExitBlink {
    cycles: u8,
    half_period_ms: Millis,
    started_at_ms: Option<Millis>,
}

impl ExitBlink {
    pub fn new(cycles: u8, half_period_ms: Millis) -> Self {
        Self {
            cycles,
            half_period_ms,
            started_at_ms: None,
        }
    }

    pub fn duration_ms(&self) -> Millis {
        u32::from(self.cycles) * 2 * self.half_period_ms
    }

    pub fn start(&mut self, now_ms: Millis) {
        self.started_at_ms = Some(now_ms);
    }

    pub fn cancel(&mut self) {
        self.started_at_ms = None;
    }

    pub fn is_running(&self, now_ms: Millis) -> bool {
        self.started_at_ms
            .map(|start| elapsed_ms(now_ms, start, self.half_period_ms) < self.duration_ms())
            .unwrap_or(false)
    }

    // Off during the first half of each cycle.
    pub fn backlight_on(&mut self, now_ms: Millis) -> bool {
        let Some(start) = self.started_at_ms else {
            return true;
        };

        let elapsed = elapsed_ms(now_ms, start, self.half_period_ms);
        if elapsed >= self.duration_ms() {
            self.started_at_ms = None;
            return true;
        }
        (elapsed / self.half_period_ms) % 2 == 1
    }
}
