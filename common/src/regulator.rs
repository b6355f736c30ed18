use std::sync::Arc;

use crate::{
    clock::Millis,
    config::RegulatorConfig,
    feedback::ExitBlink,
    hysteresis::HysteresisController,
    menu::{Menu, MenuOutcome, MenuState},
    shared::SharedState,
    types::{ButtonEvent, RelayState, TemperatureSample},
};

#[derive(Debug, Clone, PartialEq)]
pub struct RegulatorTick {
    pub relay: RelayState,
    pub relay_changed: bool,
    pub menu: MenuState,
    pub menu_changed: bool,
    pub menu_timed_out: bool,
    pub backlight_on: bool,
    pub menu_outcomes: Vec<MenuOutcome>,
}

pub struct Regulator {
    config: RegulatorConfig,
    shared: Arc<SharedState>,
    menu: Menu,
    controller: HysteresisController,
    blink: ExitBlink,
    relay: RelayState,
}

impl Regulator {
    pub fn new(mut config: RegulatorConfig, shared: Arc<SharedState>) -> Self {
        config.sanitize();
        let menu = Menu::new(
            config.menu_timeout_ms,
            config.target_step_c,
            config.hysteresis_step_c,
        );
        let controller = HysteresisController::new(config.disconnect_policy);
        let blink = ExitBlink::new(config.exit_blink_cycles, config.exit_blink_half_period_ms);
        let relay = shared.relay();

        Self {
            config,
            shared,
            menu,
            controller,
            blink,
            relay,
        }
    }

    pub fn config(&self) -> &RegulatorConfig {
        &self.config
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn relay(&self) -> RelayState {
        self.relay
    }

    pub fn tick<I>(&mut self, now_ms: Millis, sample: TemperatureSample, events: I) -> RegulatorTick
    where
        I: IntoIterator<Item = ButtonEvent>,
    {
        let menu_before = self.menu.state();
        self.shared.publish_temperature(sample);

        let mut menu_outcomes = Vec::new();
        for event in events {
            let outcome = self.menu.handle(event, &self.shared.setpoints);
            if outcome == MenuOutcome::Activated {
                self.blink.cancel();
            }
            menu_outcomes.push(outcome);
        }

        let previous = self.relay;
        self.relay = self
            .controller
            .update(sample, self.shared.setpoints.get(), previous);
        self.shared.publish_relay(self.relay);

        let menu_timed_out = self.menu.poll_timeout(now_ms);
        if menu_timed_out {
            self.blink.start(now_ms);
        }
        let backlight_on = self.blink.backlight_on(now_ms);

        let menu = self.menu.state();
        self.shared.publish_menu(menu);

        RegulatorTick {
            relay: self.relay,
            relay_changed: self.relay != previous,
            menu,
            menu_changed: menu != menu_before,
            menu_timed_out,
            backlight_on,
            menu_outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::SetpointSettings,
        setpoint::{SetpointField, SetpointState},
        types::Button,
    };

    fn regulator() -> Regulator {
        let shared = Arc::new(SharedState::new(&SetpointSettings::default()));
        Regulator::new(RegulatorConfig::default(), shared)
    }

    fn sample(celsius: f32) -> TemperatureSample {
        TemperatureSample::Valid(celsius)
    }

    fn idle(regulator: &mut Regulator, now_ms: Millis, celsius: f32) -> RegulatorTick {
        regulator.tick(now_ms, sample(celsius), std::iter::empty())
    }

    #[test]
    fn end_to_end_relay_sequence() {
        let mut regulator = regulator();

        let relays: Vec<RelayState> = [24.0, 24.6, 25.6]
            .into_iter()
            .enumerate()
            .map(|(i, celsius)| idle(&mut regulator, 1_000 + i as u32 * 100, celsius).relay)
            .collect();

        assert_eq!(relays, vec![RelayState::On, RelayState::On, RelayState::Off]);
        assert_eq!(regulator.shared().relay(), RelayState::Off);
    }

    #[test]
    fn reports_relay_transitions_only_when_they_happen() {
        let mut regulator = regulator();

        assert!(idle(&mut regulator, 100, 24.0).relay_changed);
        assert!(!idle(&mut regulator, 200, 24.2).relay_changed);
        assert!(!idle(&mut regulator, 300, 25.2).relay_changed);
        assert!(idle(&mut regulator, 400, 26.0).relay_changed);
    }

    #[test]
    fn menu_edit_applies_before_relay_decision() {
        let mut regulator = regulator();
        assert_eq!(idle(&mut regulator, 100, 24.8).relay, RelayState::Off);

        let events = [
            ButtonEvent::new(Button::Set, 200),
            ButtonEvent::new(Button::Up, 450),
        ];
        let tick = regulator.tick(500, sample(24.8), events);

        assert_eq!(tick.menu, MenuState::EditingTarget);
        assert!(tick.menu_changed);
        assert_eq!(
            tick.menu_outcomes,
            vec![
                MenuOutcome::Activated,
                MenuOutcome::Adjusted {
                    field: SetpointField::Target,
                    value: 26.0,
                },
            ]
        );
        assert_eq!(tick.relay, RelayState::On);
    }

    #[test]
    fn idle_menu_times_out_and_blinks_without_blocking() {
        let mut regulator = regulator();
        regulator.tick(1_000, sample(25.0), [ButtonEvent::new(Button::Set, 1_000)]);
        regulator.tick(1_300, sample(25.0), [ButtonEvent::new(Button::Down, 1_300)]);

        let before = idle(&mut regulator, 4_300, 25.0);
        assert_eq!(before.menu, MenuState::EditingTarget);
        assert!(before.backlight_on);

        let closed = idle(&mut regulator, 4_400, 23.0);
        assert!(closed.menu_timed_out);
        assert!(closed.menu_changed);
        assert_eq!(closed.menu, MenuState::Inactive);
        assert!(!closed.backlight_on);
        // Control keeps running during the blink.
        assert_eq!(closed.relay, RelayState::On);
        assert_eq!(regulator.shared().menu(), MenuState::Inactive);
        assert_eq!(
            regulator.shared().setpoints.get(),
            SetpointState {
                target: 24.0,
                hysteresis: 0.5,
            }
        );

        assert!(idle(&mut regulator, 4_650, 23.0).backlight_on);
        assert!(idle(&mut regulator, 6_400, 23.0).backlight_on);
    }

    #[test]
    fn reopening_menu_cancels_blink() {
        let mut regulator = regulator();
        regulator.tick(1_000, sample(25.0), [ButtonEvent::new(Button::Set, 1_000)]);
        assert!(idle(&mut regulator, 4_100, 25.0).menu_timed_out);

        let tick = regulator.tick(4_200, sample(25.0), [ButtonEvent::new(Button::Set, 4_150)]);
        assert_eq!(tick.menu, MenuState::EditingTarget);
        assert!(tick.backlight_on);
    }

    #[test]
    fn disconnected_probe_drops_relay() {
        let mut regulator = regulator();
        assert_eq!(idle(&mut regulator, 100, 20.0).relay, RelayState::On);

        let tick = regulator.tick(200, TemperatureSample::Disconnected, std::iter::empty());
        assert_eq!(tick.relay, RelayState::Off);
        assert_eq!(
            regulator.shared().temperature(),
            TemperatureSample::Disconnected
        );
    }
}
