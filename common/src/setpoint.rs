use core::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::config::{SetpointSettings, PROBE_MAX_C, PROBE_MIN_C};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SetpointState {
    pub target: f32,
    pub hysteresis: f32,
}

impl SetpointState {
    pub fn lower_bound(&self) -> f32 {
        self.target - self.hysteresis
    }

    pub fn upper_bound(&self) -> f32 {
        self.target + self.hysteresis
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointField {
    Target,
    Hysteresis,
}

/// Each field is an `f32` bit pattern in its own atomic. Writes are atomic
/// per field; a reader racing a two-field update may see one old and one
/// new value.
#[derive(Debug)]
pub struct SetpointStore {
    target_bits: AtomicU32,
    hysteresis_bits: AtomicU32,
}

impl SetpointStore {
    pub fn new(settings: &SetpointSettings) -> Self {
        let mut settings = settings.clone();
        settings.sanitize();
        Self {
            target_bits: AtomicU32::new(settings.target_c.to_bits()),
            hysteresis_bits: AtomicU32::new(settings.hysteresis_c.to_bits()),
        }
    }

    pub fn get(&self) -> SetpointState {
        SetpointState {
            target: f32::from_bits(self.target_bits.load(Ordering::Acquire)),
            hysteresis: f32::from_bits(self.hysteresis_bits.load(Ordering::Acquire)),
        }
    }

    pub fn apply_delta(&self, field: SetpointField, delta: f32) -> f32 {
        let cell = self.cell(field);
        let previous = cell
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let next = round_tenth(f32::from_bits(bits) + delta);
                Some(bound(field, next).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        bound(field, round_tenth(f32::from_bits(previous) + delta))
    }

    pub fn set_absolute(&self, target: Option<f32>, hysteresis: Option<f32>) -> SetpointState {
        if let Some(target) = target.filter(|value| value.is_finite()) {
            self.target_bits
                .store(bound(SetpointField::Target, target).to_bits(), Ordering::Release);
        }
        if let Some(hysteresis) = hysteresis.filter(|value| value.is_finite()) {
            self.hysteresis_bits.store(
                bound(SetpointField::Hysteresis, hysteresis).to_bits(),
                Ordering::Release,
            );
        }
        self.get()
    }

    fn cell(&self, field: SetpointField) -> &AtomicU32 {
        match field {
            SetpointField::Target => &self.target_bits,
            SetpointField::Hysteresis => &self.hysteresis_bits,
        }
    }
}

fn bound(field: SetpointField, value: f32) -> f32 {
    match field {
        SetpointField::Target => value.clamp(PROBE_MIN_C, PROBE_MAX_C),
        SetpointField::Hysteresis => value.max(0.0),
    }
}

pub fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn store(target_c: f32, hysteresis_c: f32) -> SetpointStore {
        SetpointStore::new(&SetpointSettings {
            target_c,
            hysteresis_c,
        })
    }

    #[test]
    fn boots_from_settings() {
        assert_eq!(
            SetpointStore::new(&SetpointSettings::default()).get(),
            SetpointState {
                target: 25.0,
                hysteresis: 0.5,
            }
        );
    }

    #[test]
    fn tenth_steps_do_not_drift() {
        let store = store(25.0, 0.5);
        for _ in 0..7 {
            store.apply_delta(SetpointField::Hysteresis, 0.1);
        }
        assert_eq!(store.get().hysteresis, 1.2);

        for _ in 0..7 {
            store.apply_delta(SetpointField::Hysteresis, -0.1);
        }
        assert_eq!(store.get().hysteresis, 0.5);
    }

    #[test]
    fn hysteresis_never_goes_negative() {
        let store = store(25.0, 0.1);

        assert_eq!(store.apply_delta(SetpointField::Hysteresis, -0.1), 0.0);
        assert_eq!(store.apply_delta(SetpointField::Hysteresis, -0.1), 0.0);
        assert_eq!(store.set_absolute(None, Some(-3.0)).hysteresis, 0.0);
    }

    #[test]
    fn target_stays_in_probe_range() {
        let store = store(124.5, 0.5);

        assert_eq!(store.apply_delta(SetpointField::Target, 1.0), PROBE_MAX_C);
        assert_eq!(store.set_absolute(Some(-80.0), None).target, PROBE_MIN_C);
    }

    #[test]
    fn absolute_update_touches_only_provided_fields() {
        let store = store(25.0, 0.5);

        let state = store.set_absolute(Some(30.5), None);
        assert_eq!(
            state,
            SetpointState {
                target: 30.5,
                hysteresis: 0.5,
            }
        );

        let state = store.set_absolute(Some(f32::NAN), Some(1.5));
        assert_eq!(
            state,
            SetpointState {
                target: 30.5,
                hysteresis: 1.5,
            }
        );
    }
}
