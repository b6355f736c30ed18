use serde::{Deserialize, Serialize};

use crate::clock::Millis;

pub const DEVICE_DISCONNECTED_C: f32 = -127.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureSample {
    Valid(f32),
    Disconnected,
}

impl TemperatureSample {
    pub fn from_celsius(raw_c: f32) -> Self {
        if !raw_c.is_finite() || raw_c == DEVICE_DISCONNECTED_C {
            Self::Disconnected
        } else {
            Self::Valid(raw_c)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeLinkChange {
    Connected(f32),
    Lost,
}

// Starts unlinked, so "no reading yet" at boot is not reported as a loss.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeLink {
    connected: bool,
}

impl ProbeLink {
    pub fn observe(&mut self, sample: TemperatureSample) -> Option<ProbeLinkChange> {
        match (self.connected, sample) {
            (false, TemperatureSample::Valid(celsius)) => {
                self.connected = true;
                Some(ProbeLinkChange::Connected(celsius))
            }
            (true, TemperatureSample::Disconnected) => {
                self.connected = false;
                Some(ProbeLinkChange::Lost)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    On,
    #[default]
    Off,
}

impl RelayState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl From<bool> for RelayState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Up,
    Down,
    Set,
}

impl Button {
    pub const ALL: [Button; 3] = [Button::Up, Button::Down, Button::Set];

    pub fn index(self) -> usize {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::Set => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Set => "set",
        }
    }

    pub fn from_command(command: &str) -> Option<Self> {
        match command.trim().to_ascii_lowercase().as_str() {
            "u" | "up" | "+" => Some(Self::Up),
            "d" | "down" | "-" => Some(Self::Down),
            "s" | "set" => Some(Self::Set),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub at_ms: Millis,
}

impl ButtonEvent {
    pub fn new(button: Button, at_ms: Millis) -> Self {
        Self { button, at_ms }
    }
}
