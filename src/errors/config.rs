use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Invalid capture settings: {0}")]
    Capture(String),

    #[error("Invalid event settings: {0}")]
    Events(String),

    #[error("Invalid HTTP settings: {0}")]
    Http(String),

    #[error("Invalid logging settings: {0}")]
    Logging(String),

    #[error("Sensor binding {name:?} rejected: {details}")]
    SensorBinding { name: String, details: String },
}

impl ConfigValidationError {
    pub fn capture(details: impl Into<String>) -> Self {
        ConfigValidationError::Capture(details.into())
    }

    pub fn events(details: impl Into<String>) -> Self {
        ConfigValidationError::Events(details.into())
    }

    pub fn http(details: impl Into<String>) -> Self {
        ConfigValidationError::Http(details.into())
    }

    pub fn logging(details: impl Into<String>) -> Self {
        ConfigValidationError::Logging(details.into())
    }

    pub fn sensor_binding(name: impl Into<String>, details: impl Into<String>) -> Self {
        ConfigValidationError::SensorBinding {
            name: name.into(),
            details: details.into(),
        }
    }
}
