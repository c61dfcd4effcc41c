//! Error types for the todolist client and service.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level client error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Service error: {0}")]
    Transport(#[from] TransportError),

    #[error("Token cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Token acquisition errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable cached token and the caller did not allow a prompt.
    #[error("User interaction is required to acquire a token")]
    InteractionRequired,

    /// The user declined or cancelled the sign-in.
    #[error("Access denied by the user or the identity provider")]
    AccessDenied,

    /// Error reported by the identity provider, passed through unchanged.
    #[error("{message} (error code: {code})")]
    Provider { code: String, message: String },

    #[error("Invalid authorization code")]
    InvalidAuthCode,

    #[error("State validation failed (possible CSRF attack)")]
    StateValidationFailed,

    #[error("OAuth callback timeout")]
    CallbackTimeout,

    #[error("Failed to open browser: {0}")]
    BrowserLaunch(String),

    #[error("Token request failed: {0}")]
    Transport(String),
}

impl AuthError {
    /// Map an OAuth error code and description onto the taxonomy.
    pub fn from_provider(code: &str, message: &str) -> Self {
        match code {
            "access_denied" => Self::AccessDenied,
            "interaction_required" | "login_required" | "consent_required" => {
                Self::InteractionRequired
            }
            _ => Self::Provider {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    /// Reinterpret an error from the refresh-token grant.
    ///
    /// A rejected refresh token (`invalid_grant`) only means the user has to
    /// sign in again. On other grants `invalid_grant` stays a provider error.
    pub fn for_refresh(self) -> Self {
        match self {
            Self::Provider { code, .. } if code == "invalid_grant" => Self::InteractionRequired,
            other => other,
        }
    }
}

/// Input validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    EmptyTitle,
}

/// Service-side authorization failures. Every variant is answered with 401.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Authorization header with a bearer token is required")]
    MissingToken,

    #[error("Bearer token rejected: {0}")]
    InvalidToken(String),

    #[error("The Scope claim does not contain '{required}' or scope claim not found")]
    MissingScope { required: String },

    #[error("The subject claim was not found")]
    MissingSubject,
}

/// Errors calling the to-do list service.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse service response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

/// Token cache file errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read token cache: {0}")]
    ReadFailed(String),

    #[error("Failed to write token cache: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Returns a user-friendly message for display in the terminal.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(AuthError::InteractionRequired) => "Please sign in first".to_string(),
            Self::Auth(AuthError::AccessDenied) => "Sign-in was cancelled.".to_string(),
            Self::Auth(AuthError::Provider { code, message }) => {
                format!("{} Error Code: {}", message, code)
            }
            Self::Auth(AuthError::StateValidationFailed) => {
                "Security error. Please try signing in again.".to_string()
            }
            Self::Auth(AuthError::CallbackTimeout) => {
                "Sign-in timed out. Please try again.".to_string()
            }
            Self::Auth(e) => e.to_string(),
            Self::Validation(ValidationError::EmptyTitle) => {
                "Please enter a value for the To Do item name".to_string()
            }
            Self::Transport(TransportError::Status { reason, .. }) => {
                format!("An error occurred : {}", reason)
            }
            Self::Transport(TransportError::Network(_)) => {
                "Network error. Check your connection.".to_string()
            }
            Self::Transport(e) => format!("An error occurred : {}", e),
            Self::Cache(_) => "Failed to access the token cache.".to_string(),
        }
    }

    /// Returns true if the user has to sign in before retrying.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Self::Auth(AuthError::InteractionRequired))
            || matches!(self, Self::Transport(e) if e.is_unauthorized())
    }
}
