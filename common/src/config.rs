use serde::{Deserialize, Serialize};

use crate::{clock::Millis, debounce::DebounceMode, hysteresis::DisconnectPolicy};

// DS18B20 measurable range.
pub const PROBE_MIN_C: f32 = -55.0;
pub const PROBE_MAX_C: f32 = 125.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    pub debounce_ms: Millis,
    pub debounce_mode: DebounceMode,
    pub menu_timeout_ms: Millis,
    pub loop_period_ms: Millis,
    pub exit_blink_cycles: u8,
    pub exit_blink_half_period_ms: Millis,
    pub target_step_c: f32,
    pub hysteresis_step_c: f32,
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            debounce_mode: DebounceMode::PerButton,
            menu_timeout_ms: 3_000,
            loop_period_ms: 100,
            exit_blink_cycles: 4,
            exit_blink_half_period_ms: 250,
            target_step_c: 1.0,
            hysteresis_step_c: 0.1,
            disconnect_policy: DisconnectPolicy::ForceOff,
        }
    }
}

impl RegulatorConfig {
    pub fn sanitize(&mut self) {
        self.debounce_ms = self.debounce_ms.clamp(10, 2_000);
        self.menu_timeout_ms = self.menu_timeout_ms.clamp(500, 60_000);
        self.loop_period_ms = self.loop_period_ms.clamp(10, 1_000);
        self.exit_blink_cycles = self.exit_blink_cycles.min(10);
        self.exit_blink_half_period_ms = self.exit_blink_half_period_ms.clamp(50, 1_000);

        if !self.target_step_c.is_finite() || self.target_step_c <= 0.0 {
            self.target_step_c = 1.0;
        }
        if !self.hysteresis_step_c.is_finite() || self.hysteresis_step_c <= 0.0 {
            self.hysteresis_step_c = 0.1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointSettings {
    pub target_c: f32,
    pub hysteresis_c: f32,
}

impl Default for SetpointSettings {
    fn default() -> Self {
        Self {
            target_c: 25.0,
            hysteresis_c: 0.5,
        }
    }
}

impl SetpointSettings {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.target_c.is_finite() {
            self.target_c = defaults.target_c;
        }
        if !self.hysteresis_c.is_finite() {
            self.hysteresis_c = defaults.hysteresis_c;
        }
        self.target_c = self.target_c.clamp(PROBE_MIN_C, PROBE_MAX_C);
        self.hysteresis_c = self.hysteresis_c.max(0.0);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub http_port: u16,
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            http_port: 80,
            connect_attempts: 10,
            retry_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub regulator: RegulatorConfig,
    pub setpoints: SetpointSettings,
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.regulator.sanitize();
        self.setpoints.sanitize();
        self.network.connect_attempts = self.network.connect_attempts.max(1);
    }
}
