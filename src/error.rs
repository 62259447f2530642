//! Error types for the pickup service
//!
//! Domain failures are raised as [`PickupError`] inside an `anyhow::Error` so
//! callers can either propagate them with `?` or recover the specific variant
//! with `downcast_ref`.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific pickup scenarios
#[derive(Debug, Clone, thiserror::Error)]
pub enum PickupError {
    #[error("A queue named '{name}' already exists")]
    DuplicateQueue { name: String },

    #[error("Queue not found: {name}")]
    NoSuchQueue { name: String },

    #[error("Queue '{name}' has already started")]
    QueueStarted { name: String },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("User {user_id} is flagged: {reason}")]
    UserFlagged { user_id: u64, reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Game server {address} is unreachable: {message}")]
    RconUnreachable { address: String, message: String },

    #[error("Malformed game server response: {reason}")]
    RconMalformedResponse { reason: String },

    #[error("Queue store failure: {message}")]
    StoreFailure { message: String },

    #[error("Chat platform failure: {message}")]
    PlatformFailure { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl PickupError {
    /// Whether the error is a user-facing refusal rather than an infrastructure failure
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            PickupError::DuplicateQueue { .. }
                | PickupError::NoSuchQueue { .. }
                | PickupError::QueueStarted { .. }
                | PickupError::PermissionDenied { .. }
                | PickupError::UserFlagged { .. }
                | PickupError::InvalidRequest { .. }
        )
    }
}

/// Look up the pickup error carried by an `anyhow::Error`, if any
pub fn pickup_error(error: &anyhow::Error) -> Option<&PickupError> {
    error.downcast_ref::<PickupError>()
}
