use serde::Serialize;

use crate::{
    clock::{elapsed_ms, Millis},
    setpoint::{SetpointField, SetpointStore},
    types::{Button, ButtonEvent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MenuState {
    #[default]
    Inactive,
    EditingTarget,
    EditingHysteresis,
    ViewingNetworkInfo,
}

impl MenuState {
    pub fn is_active(self) -> bool {
        self != Self::Inactive
    }

    pub fn next(self) -> Self {
        match self {
            Self::Inactive => Self::EditingTarget,
            Self::EditingTarget => Self::EditingHysteresis,
            Self::EditingHysteresis => Self::ViewingNetworkInfo,
            Self::ViewingNetworkInfo => Self::EditingTarget,
        }
    }

    pub fn field(self) -> Option<SetpointField> {
        match self {
            Self::EditingTarget => Some(SetpointField::Target),
            Self::EditingHysteresis => Some(SetpointField::Hysteresis),
            Self::Inactive | Self::ViewingNetworkInfo => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::EditingTarget => "EDITING_TARGET",
            Self::EditingHysteresis => "EDITING_HYSTERESIS",
            Self::ViewingNetworkInfo => "VIEWING_NETWORK_INFO",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::EditingTarget => 1,
            Self::EditingHysteresis => 2,
            Self::ViewingNetworkInfo => 3,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::EditingTarget,
            2 => Self::EditingHysteresis,
            3 => Self::ViewingNetworkInfo,
            _ => Self::Inactive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuOutcome {
    Ignored,
    Activated,
    Advanced(MenuState),
    Adjusted { field: SetpointField, value: f32 },
}

#[derive(Debug, Clone)]
pub struct Menu {
    state: MenuState,
    last_activity_ms: Millis,
    timeout_ms: Millis,
    target_step_c: f32,
    hysteresis_step_c: f32,
}

impl Menu {
    pub fn new(timeout_ms: Millis, target_step_c: f32, hysteresis_step_c: f32) -> Self {
        Self {
            state: MenuState::Inactive,
            last_activity_ms: 0,
            timeout_ms,
            target_step_c,
            hysteresis_step_c,
        }
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_active()
    }

    pub fn last_activity_ms(&self) -> Millis {
        self.last_activity_ms
    }

    pub fn handle(&mut self, event: ButtonEvent, setpoints: &SetpointStore) -> MenuOutcome {
        // Any accepted press counts as activity, even with the menu closed.
        self.last_activity_ms = event.at_ms;

        match (event.button, self.state) {
            (Button::Set, MenuState::Inactive) => {
                self.state = MenuState::EditingTarget;
                MenuOutcome::Activated
            }
            (Button::Set, state) => {
                self.state = state.next();
                MenuOutcome::Advanced(self.state)
            }
            (Button::Up | Button::Down, state) => {
                let Some(field) = state.field() else {
                    return MenuOutcome::Ignored;
                };
                let step = match field {
                    SetpointField::Target => self.target_step_c,
                    SetpointField::Hysteresis => self.hysteresis_step_c,
                };
                let delta = if event.button == Button::Up { step } else { -step };
                MenuOutcome::Adjusted {
                    field,
                    value: setpoints.apply_delta(field, delta),
                }
            }
        }
    }

    /// Closes the menu once it has been idle for longer than the timeout.
    /// Returns `true` on the poll that closed it.
    pub fn poll_timeout(&mut self, now_ms: Millis) -> bool {
        if !self.state.is_active() {
            return false;
        }
        if elapsed_ms(now_ms, self.last_activity_ms, self.timeout_ms) <= self.timeout_ms {
            return false;
        }
        self.state = MenuState::Inactive;
        true
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::SetpointSettings, setpoint::SetpointState};

    fn fixture() -> (Menu, SetpointStore) {
        (
            Menu::new(3_000, 1.0, 0.1),
            SetpointStore::new(&SetpointSettings::default()),
        )
    }

    fn press(menu: &mut Menu, store: &SetpointStore, button: Button, at_ms: Millis) -> MenuOutcome {
        menu.handle(ButtonEvent::new(button, at_ms), store)
    }

    #[test]
    fn set_cycles_through_fields() {
        let (mut menu, store) = fixture();
        let mut observed = Vec::new();

        for i in 0..5 {
            press(&mut menu, &store, Button::Set, 1_000 + i * 300);
            observed.push(menu.state());
        }

        assert_eq!(
            observed,
            vec![
                MenuState::EditingTarget,
                MenuState::EditingHysteresis,
                MenuState::ViewingNetworkInfo,
                MenuState::EditingTarget,
                MenuState::EditingHysteresis,
            ]
        );
    }

    #[test]
    fn activation_does_not_touch_setpoints() {
        let (mut menu, store) = fixture();

        assert_eq!(press(&mut menu, &store, Button::Set, 1_000), MenuOutcome::Activated);
        assert_eq!(store.get(), SetpointState { target: 25.0, hysteresis: 0.5 });
    }

    #[test]
    fn up_down_adjust_the_edited_field() {
        let (mut menu, store) = fixture();
        press(&mut menu, &store, Button::Set, 1_000);

        assert_eq!(
            press(&mut menu, &store, Button::Up, 1_300),
            MenuOutcome::Adjusted {
                field: SetpointField::Target,
                value: 26.0,
            }
        );
        press(&mut menu, &store, Button::Up, 1_600);
        press(&mut menu, &store, Button::Down, 1_900);
        assert_eq!(store.get().target, 26.0);

        press(&mut menu, &store, Button::Set, 2_200);
        press(&mut menu, &store, Button::Down, 2_500);
        press(&mut menu, &store, Button::Down, 2_800);
        assert_eq!(store.get(), SetpointState { target: 26.0, hysteresis: 0.3 });
    }

    #[test]
    fn network_info_ignores_up_down() {
        let (mut menu, store) = fixture();
        for i in 0..3 {
            press(&mut menu, &store, Button::Set, 1_000 + i * 300);
        }
        assert_eq!(menu.state(), MenuState::ViewingNetworkInfo);

        assert_eq!(press(&mut menu, &store, Button::Up, 2_000), MenuOutcome::Ignored);
        assert_eq!(press(&mut menu, &store, Button::Down, 2_300), MenuOutcome::Ignored);
        assert_eq!(store.get(), SetpointState { target: 25.0, hysteresis: 0.5 });
    }

    #[test]
    fn inactive_menu_ignores_up_down_but_records_activity() {
        let (mut menu, store) = fixture();

        assert_eq!(press(&mut menu, &store, Button::Up, 4_000), MenuOutcome::Ignored);
        assert_eq!(press(&mut menu, &store, Button::Down, 4_300), MenuOutcome::Ignored);
        assert_eq!(menu.state(), MenuState::Inactive);
        assert_eq!(menu.last_activity_ms(), 4_300);
        assert_eq!(store.get().target, 25.0);
    }

    #[test]
    fn only_three_sets_reach_network_info() {
        for presses in 0..7u32 {
            let (mut menu, store) = fixture();
            for i in 0..presses {
                press(&mut menu, &store, Button::Set, 1_000 + i * 300);
            }
            assert_eq!(
                menu.state() == MenuState::ViewingNetworkInfo,
                presses % 3 == 0 && presses > 0,
                "after {presses} presses"
            );
        }
    }

    #[test]
    fn times_out_after_idle_period() {
        let (mut menu, store) = fixture();
        press(&mut menu, &store, Button::Set, 1_000);
        press(&mut menu, &store, Button::Up, 1_500);

        assert!(!menu.poll_timeout(4_500));
        assert!(menu.is_open());
        assert!(menu.poll_timeout(4_501));
        assert_eq!(menu.state(), MenuState::Inactive);
        assert_eq!(store.get(), SetpointState { target: 26.0, hysteresis: 0.5 });
        assert!(!menu.poll_timeout(9_000));
    }

    #[test]
    fn network_info_times_out_with_setpoints_unchanged() {
        let (mut menu, store) = fixture();
        for i in 0..3 {
            press(&mut menu, &store, Button::Set, 1_000 + i * 300);
        }
        press(&mut menu, &store, Button::Up, 1_700);
        assert_eq!(menu.state(), MenuState::ViewingNetworkInfo);

        assert!(!menu.poll_timeout(4_700));
        assert!(menu.poll_timeout(4_701));
        assert_eq!(menu.state(), MenuState::Inactive);
        assert_eq!(store.get(), SetpointState { target: 25.0, hysteresis: 0.5 });
    }

    #[test]
    fn timeout_restarts_at_target_field() {
        let (mut menu, store) = fixture();
        press(&mut menu, &store, Button::Set, 1_000);
        press(&mut menu, &store, Button::Set, 1_300);
        assert!(menu.poll_timeout(5_000));

        press(&mut menu, &store, Button::Set, 6_000);
        assert_eq!(menu.state(), MenuState::EditingTarget);
    }

    #[test]
    fn event_stamped_after_loop_clock_does_not_time_out() {
        let (mut menu, store) = fixture();
        press(&mut menu, &store, Button::Set, 10_005);

        assert!(!menu.poll_timeout(10_000));
        assert!(menu.is_open());
    }
}
