pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod feedback;
pub mod hysteresis;
pub mod input;
pub mod menu;
pub mod regulator;
pub mod setpoint;
pub mod shared;
pub mod status;
pub mod types;

pub use clock::{elapsed_ms, Millis};
pub use config::{NetworkConfig, RegulatorConfig, RuntimeConfig, SetpointSettings};
pub use debounce::{DebounceMode, Debouncer};
pub use error::RegulatorError;
pub use feedback::ExitBlink;
pub use hysteresis::{DisconnectPolicy, HysteresisController};
pub use input::ButtonInbox;
pub use menu::{Menu, MenuOutcome, MenuState};
pub use regulator::{Regulator, RegulatorTick};
pub use setpoint::{SetpointField, SetpointState, SetpointStore};
pub use shared::{SharedState, StatusSnapshot};
pub use status::{render_status_page, DataPayload, SettingsResponse, SettingsUpdate};
pub use types::{
    Button, ButtonEvent, ProbeLink, ProbeLinkChange, RelayState, TemperatureSample,
};
