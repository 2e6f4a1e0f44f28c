use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read configuration: {0}")]
    ConfigIo(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),
    #[error(
        "{component}: timestamp moved backwards ({current} < {previous})"
    )]
    NonMonotonicTimestamp {
        component: &'static str,
        previous: f64,
        current: f64,
    },
    #[error("calibration failed: {0}")]
    Calibration(String),
}
