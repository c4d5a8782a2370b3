use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Service Error: {0}")]
    Service(#[from] ServiceError),
    #[error("Invalid setting {0}: {1}")]
    InvalidSetting(&'static str, String),
    #[error("Workflow runtime stopped")]
    RuntimeStopped,
    #[error("UI Error: {0}")]
    Ui(String),
}

// Capture Provider Error Type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture cancelled by the user")]
    UserCancelled,
    #[error("Camera unavailable: {0}")]
    Device(String),
}

// Identification Service transport Error Type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("The identification service did not answer in time")]
    Timeout,
    #[error("Failed to reach the identification service: {0}")]
    Unreachable(String),
    #[error("Unexpected response from the identification service: {0}")]
    Protocol(String),
    #[error("{0}")]
    Rejected(String),
}

impl ServiceError {
    /// Transport failures get a generic message, a rejection is shown verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Rejected(message) => message.clone(),
            _ => CONNECTIVITY_MESSAGE.to_string(),
        }
    }

    /// Recovers a `ServiceError` from the boxed error produced by tower middleware.
    pub fn from_boxed(error: tower::BoxError) -> Self {
        if error.is::<tower::timeout::error::Elapsed>() {
            return ServiceError::Timeout;
        }
        match error.downcast::<ServiceError>() {
            Ok(service_error) => *service_error,
            Err(other) => ServiceError::Unreachable(other.to_string()),
        }
    }
}

pub const CONNECTIVITY_MESSAGE: &str = "Could not reach the identification service. Is it running?";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_share_the_generic_message() {
        assert_eq!(ServiceError::Timeout.user_message(), CONNECTIVITY_MESSAGE);
        assert_eq!(
            ServiceError::Unreachable("connection refused".into()).user_message(),
            CONNECTIVITY_MESSAGE
        );
        assert_eq!(
            ServiceError::Rejected("no leaflet loaded".into()).user_message(),
            "no leaflet loaded"
        );
    }

    #[test]
    fn boxed_errors_are_classified() {
        let elapsed: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert_eq!(ServiceError::from_boxed(elapsed), ServiceError::Timeout);

        let inner: tower::BoxError = Box::new(ServiceError::Protocol("bad json".into()));
        assert_eq!(
            ServiceError::from_boxed(inner),
            ServiceError::Protocol("bad json".into())
        );
    }
}
