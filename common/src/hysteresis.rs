use serde::{Deserialize, Serialize};

use crate::{
    setpoint::SetpointState,
    types::{RelayState, TemperatureSample},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    #[default]
    ForceOff,
    HoldLast,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HysteresisController {
    policy: DisconnectPolicy,
}

impl HysteresisController {
    pub fn new(policy: DisconnectPolicy) -> Self {
        Self { policy }
    }

    pub fn update(
        &self,
        sample: TemperatureSample,
        setpoint: SetpointState,
        previous: RelayState,
    ) -> RelayState {
        let TemperatureSample::Valid(celsius) = sample else {
            return match self.policy {
                DisconnectPolicy::ForceOff => RelayState::Off,
                DisconnectPolicy::HoldLast => previous,
            };
        };

        if celsius < setpoint.lower_bound() {
            RelayState::On
        } else if celsius > setpoint.upper_bound() {
            RelayState::Off
        } else {
            previous
        }
    }
}
