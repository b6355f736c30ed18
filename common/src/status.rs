use serde::Serialize;

use crate::{
    error::RegulatorError,
    setpoint::{round_tenth, SetpointStore},
    shared::StatusSnapshot,
    types::TemperatureSample,
};

pub const FIELD_TARGET: &str = "targetTemperature";
pub const FIELD_HYSTERESIS: &str = "hysteresis";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPayload {
    pub temperature: Option<f32>,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: f32,
    pub hysteresis: f32,
    #[serde(rename = "relayState")]
    pub relay_state: bool,
}

impl From<&StatusSnapshot> for DataPayload {
    fn from(snapshot: &StatusSnapshot) -> Self {
        Self {
            temperature: match snapshot.temperature {
                TemperatureSample::Valid(celsius) => Some(round_tenth(celsius)),
                TemperatureSample::Disconnected => None,
            },
            target_temperature: round_tenth(snapshot.setpoint.target),
            hysteresis: round_tenth(snapshot.setpoint.hysteresis),
            relay_state: snapshot.relay.is_on(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl SettingsResponse {
    pub fn updated() -> Self {
        Self {
            status: "OK",
            message: "Settings updated",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub target_temperature: Option<f32>,
    pub hysteresis: Option<f32>,
    pub rejected: Vec<RegulatorError>,
}

impl SettingsUpdate {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut update = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                FIELD_TARGET => {
                    if let Some(target) = update.parse(FIELD_TARGET, value) {
                        update.target_temperature = Some(target);
                    }
                }
                FIELD_HYSTERESIS => {
                    if let Some(hysteresis) = update.parse(FIELD_HYSTERESIS, value) {
                        update.hysteresis = Some(hysteresis);
                    }
                }
                _ => {}
            }
        }
        update
    }

    // For servers without a form decoder. Later sources win.
    pub fn from_forms<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::from_pairs(sources.into_iter().flat_map(parse_form))
    }

    pub fn is_empty(&self) -> bool {
        self.target_temperature.is_none() && self.hysteresis.is_none()
    }

    pub fn apply(&self, setpoints: &SetpointStore) {
        setpoints.set_absolute(self.target_temperature, self.hysteresis);
    }

    fn parse(&mut self, field: &'static str, value: &str) -> Option<f32> {
        match value.trim().parse::<f32>() {
            Ok(parsed) if parsed.is_finite() => Some(parsed),
            _ => {
                self.rejected.push(RegulatorError::MalformedRequestField {
                    field,
                    value: value.to_string(),
                });
                None
            }
        }
    }
}

pub fn parse_form(input: &str) -> Vec<(String, String)> {
    input
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(high), Some(low)) => {
                        out.push((high << 4) | low);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub fn render_status_page(snapshot: &StatusSnapshot) -> String {
    let data = DataPayload::from(snapshot);
    let temperature = match data.temperature {
        Some(celsius) => format!("{celsius:.1} &deg;C"),
        None => "Error".to_string(),
    };
    let relay = if data.relay_state {
        "<span style='color: green;'>ON</span>"
    } else {
        "<span style='color: red;'>OFF</span>"
    };

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="UTF-8">
<meta http-equiv="refresh" content="5">
<title>Temperature Regulator</title>
</head>
<body style="font-family: Arial, sans-serif; color: #333;">
<h1>Temperature Regulator</h1>
<p><strong>Current temperature (TP):</strong> {temperature}</p>
<p><strong>Target temperature (TS):</strong> {target:.1} &deg;C</p>
<p><strong>Hysteresis (H):</strong> {hysteresis:.1} &deg;C</p>
<p><strong>Relay:</strong> {relay}</p>
<p><strong>Menu:</strong> {menu}</p>
<h3>Update settings</h3>
<form action="/settings" method="POST">
<label for="{FIELD_TARGET}">Target temperature (TS):</label>
<input type="number" id="{FIELD_TARGET}" name="{FIELD_TARGET}" step="0.1" value="{target:.1}"><br><br>
<label for="{FIELD_HYSTERESIS}">Hysteresis:</label>
<input type="number" id="{FIELD_HYSTERESIS}" name="{FIELD_HYSTERESIS}" step="0.1" min="0" value="{hysteresis:.1}"><br><br>
<input type="submit" value="Update">
</form>
</body>
</html>
"#,
        target = data.target_temperature,
        hysteresis = data.hysteresis,
        menu = snapshot.menu.as_str(),
    )
}
