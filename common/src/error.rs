use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegulatorError {
    #[error("temperature probe disconnected")]
    SensorDisconnected,
    #[error("network unavailable after {attempts} connection attempts")]
    NetworkUnavailable { attempts: u32 },
    #[error("malformed value {value:?} for field `{field}`")]
    MalformedRequestField { field: &'static str, value: String },
}
