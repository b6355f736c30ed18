use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::{
    config::SetpointSettings,
    menu::MenuState,
    setpoint::{SetpointState, SetpointStore},
    types::{RelayState, TemperatureSample},
};

// A quiet NaN no probe driver produces; marks "disconnected" in the cell.
const DISCONNECTED_BITS: u32 = 0x7fc0_dead;

#[derive(Debug)]
pub struct SampleCell(AtomicU32);

impl SampleCell {
    pub fn new() -> Self {
        Self(AtomicU32::new(DISCONNECTED_BITS))
    }

    pub fn load(&self) -> TemperatureSample {
        match self.0.load(Ordering::Acquire) {
            DISCONNECTED_BITS => TemperatureSample::Disconnected,
            bits => TemperatureSample::Valid(f32::from_bits(bits)),
        }
    }

    pub fn store(&self, sample: TemperatureSample) {
        let bits = match sample {
            TemperatureSample::Valid(celsius) if celsius.is_finite() => celsius.to_bits(),
            _ => DISCONNECTED_BITS,
        };
        self.0.store(bits, Ordering::Release);
    }
}

impl Default for SampleCell {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct SharedState {
    pub setpoints: SetpointStore,
    temperature: SampleCell,
    relay_on: AtomicBool,
    menu: AtomicU8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub temperature: TemperatureSample,
    pub setpoint: SetpointState,
    pub relay: RelayState,
    pub menu: MenuState,
}

impl SharedState {
    pub fn new(settings: &SetpointSettings) -> Self {
        Self {
            setpoints: SetpointStore::new(settings),
            temperature: SampleCell::new(),
            relay_on: AtomicBool::new(false),
            menu: AtomicU8::new(MenuState::Inactive.to_u8()),
        }
    }

    pub fn temperature(&self) -> TemperatureSample {
        self.temperature.load()
    }

    pub fn relay(&self) -> RelayState {
        RelayState::from(self.relay_on.load(Ordering::Acquire))
    }

    pub fn menu(&self) -> MenuState {
        MenuState::from_u8(self.menu.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            temperature: self.temperature(),
            setpoint: self.setpoints.get(),
            relay: self.relay(),
            menu: self.menu(),
        }
    }

    pub(crate) fn publish_temperature(&self, sample: TemperatureSample) {
        self.temperature.store(sample);
    }

    pub(crate) fn publish_relay(&self, relay: RelayState) {
        self.relay_on.store(relay.is_on(), Ordering::Release);
    }

    pub(crate) fn publish_menu(&self, menu: MenuState) {
        self.menu.store(menu.to_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_cell_keeps_disconnected_apart_from_readings() {
        let cell = SampleCell::new();
        assert_eq!(cell.load(), TemperatureSample::Disconnected);

        cell.store(TemperatureSample::Valid(-3.25));
        assert_eq!(cell.load(), TemperatureSample::Valid(-3.25));

        cell.store(TemperatureSample::Disconnected);
        assert_eq!(cell.load(), TemperatureSample::Disconnected);
    }

    #[test]
    fn boots_idle_with_relay_off() {
        let shared = SharedState::new(&SetpointSettings::default());
        let snapshot = shared.snapshot();

        assert_eq!(snapshot.relay, RelayState::Off);
        assert_eq!(snapshot.menu, MenuState::Inactive);
        assert_eq!(snapshot.temperature, TemperatureSample::Disconnected);
    }
}
