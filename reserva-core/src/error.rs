use serde_json::{json, Value};

/// Stable machine-readable conflict codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCode {
    ResourceLocked,
    AlreadyBooked,
    IdempotencyInProgress,
}

impl ConflictCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictCode::ResourceLocked => "RESOURCE_LOCKED",
            ConflictCode::AlreadyBooked => "ALREADY_BOOKED",
            ConflictCode::IdempotencyInProgress => "IDEMPOTENCY_IN_PROGRESS",
        }
    }
}

/// External error taxonomy for the booking core. Every internal fault is
/// translated into one of these before crossing the component boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Conflict {
        code: ConflictCode,
        message: String,
    },

    #[error("{message}")]
    Server { message: String },
}

impl BookingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BookingError::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(code: ConflictCode, message: impl Into<String>) -> Self {
        BookingError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        BookingError::Server {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            BookingError::Validation { .. } => 400,
            BookingError::Conflict { .. } => 409,
            BookingError::Server { .. } => 500,
        }
    }

    /// The JSON body clients receive. Server faults stay opaque beyond a
    /// generic description; conflicts always carry their machine code.
    pub fn response_body(&self) -> Value {
        match self {
            BookingError::Validation { message } => json!({ "error": message }),
            BookingError::Conflict { code, message } => json!({
                "error": message,
                "code": code.as_str(),
            }),
            BookingError::Server { message } => json!({
                "error": "Failed to create booking",
                "details": message,
            }),
        }
    }
}
