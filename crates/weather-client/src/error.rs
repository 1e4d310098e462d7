use thiserror::Error;

use crate::device::GeolocationError;
use crate::providers::ProviderError;

pub const NO_NETWORK_MESSAGE: &str = "No network connection.";
pub const CITY_NOT_FOUND_MESSAGE: &str = "City not found.";
pub const SELECT_CITY_MESSAGE: &str = "Please select a city first.";
pub const LOCATION_DENIED_MESSAGE: &str = "Permission to access location was denied";

/// Failure of a coordinator operation. `Display` is the reason published to
/// the session's error field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("No network connection.")]
    Connectivity,
    #[error("City not found.")]
    NotFound,
    #[error("Please select a city first.")]
    Validation,
    #[error("Permission to access location was denied")]
    PermissionDenied,
    #[error("{0}")]
    Provider(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::NotFound | FetchError::Validation | FetchError::PermissionDenied => {
                ErrorKind::User
            }
            FetchError::Connectivity | FetchError::Provider(_) => ErrorKind::Runtime,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Connectivity => "runtime.offline",
            FetchError::NotFound => "user.city_not_found",
            FetchError::Validation => "user.invalid_input",
            FetchError::PermissionDenied => "user.location_denied",
            FetchError::Provider(_) => "runtime.provider_failed",
        }
    }
}

impl From<ProviderError> for FetchError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::NotFound(_) => FetchError::NotFound,
            other => FetchError::Provider(other.to_string()),
        }
    }
}

impl From<GeolocationError> for FetchError {
    fn from(value: GeolocationError) -> Self {
        match value {
            GeolocationError::PermissionDenied => FetchError::PermissionDenied,
            GeolocationError::Unavailable(message) => FetchError::Provider(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::User,
            code: "user.invalid_input",
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            code: "runtime.failed",
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::User => 2,
            ErrorKind::Runtime => 1,
        }
    }
}

impl From<FetchError> for AppError {
    fn from(value: FetchError) -> Self {
        Self {
            kind: value.kind(),
            code: value.code(),
            message: value.to_string(),
        }
    }
}
