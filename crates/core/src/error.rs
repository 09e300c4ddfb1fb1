#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid time of day '{0}': expected HH:MM")]
    InvalidTimeOfDay(String),
}
