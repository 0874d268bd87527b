use std::fmt;
use thiserror::Error;

/// Outcome of a Play Services connection attempt, as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResult {
    pub error_code: i32,
    pub error_message: Option<String>,
    /// Whether the user can resolve the failure, e.g. by signing in.
    pub has_resolution: bool,
}

impl ConnectionResult {
    pub const SUCCESS: i32 = 0;
    pub const SERVICE_MISSING: i32 = 1;
    pub const SERVICE_VERSION_UPDATE_REQUIRED: i32 = 2;
    pub const SERVICE_DISABLED: i32 = 3;
    pub const SIGN_IN_REQUIRED: i32 = 4;
    pub const INVALID_ACCOUNT: i32 = 5;
    pub const RESOLUTION_REQUIRED: i32 = 6;
    pub const NETWORK_ERROR: i32 = 7;
    pub const INTERNAL_ERROR: i32 = 8;
    pub const SERVICE_INVALID: i32 = 9;
    pub const DEVELOPER_ERROR: i32 = 10;
    pub const LICENSE_CHECK_FAILED: i32 = 11;
    pub const CANCELED: i32 = 13;
    pub const TIMEOUT: i32 = 14;
    pub const INTERRUPTED: i32 = 15;
    pub const API_UNAVAILABLE: i32 = 16;
    pub const SIGN_IN_FAILED: i32 = 17;
    pub const SERVICE_UPDATING: i32 = 18;

    pub fn new(error_code: i32) -> Self {
        Self {
            error_code,
            error_message: None,
            has_resolution: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_resolution(mut self) -> Self {
        self.has_resolution = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error_code == Self::SUCCESS
    }

    /// Symbolic name of an error code, `UNKNOWN_ERROR_CODE(n)` for codes without one.
    pub fn code_name(code: i32) -> String {
        let name = match code {
            Self::SUCCESS => "SUCCESS",
            Self::SERVICE_MISSING => "SERVICE_MISSING",
            Self::SERVICE_VERSION_UPDATE_REQUIRED => "SERVICE_VERSION_UPDATE_REQUIRED",
            Self::SERVICE_DISABLED => "SERVICE_DISABLED",
            Self::SIGN_IN_REQUIRED => "SIGN_IN_REQUIRED",
            Self::INVALID_ACCOUNT => "INVALID_ACCOUNT",
            Self::RESOLUTION_REQUIRED => "RESOLUTION_REQUIRED",
            Self::NETWORK_ERROR => "NETWORK_ERROR",
            Self::INTERNAL_ERROR => "INTERNAL_ERROR",
            Self::SERVICE_INVALID => "SERVICE_INVALID",
            Self::DEVELOPER_ERROR => "DEVELOPER_ERROR",
            Self::LICENSE_CHECK_FAILED => "LICENSE_CHECK_FAILED",
            Self::CANCELED => "CANCELED",
            Self::TIMEOUT => "TIMEOUT",
            Self::INTERRUPTED => "INTERRUPTED",
            Self::API_UNAVAILABLE => "API_UNAVAILABLE",
            Self::SIGN_IN_FAILED => "SIGN_IN_FAILED",
            Self::SERVICE_UPDATING => "SERVICE_UPDATING",
            _ => return format!("UNKNOWN_ERROR_CODE({})", code),
        };
        name.to_string()
    }
}

impl fmt::Display for ConnectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::code_name(self.error_code))?;
        if let Some(message) = &self.error_message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Errors raised by the Play Services helpers and the cached access token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayServiceError {
    /// The app is misconfigured, e.g. a wrong OAuth client or signing key.
    #[error("developer configuration error: {0}")]
    DeveloperImplementFailed(ConnectionResult),
    /// The connection was suspended and must be made again.
    #[error("connection suspended (cause {0}), reconnect required")]
    RequireRetryConnect(i32),
    #[error("sign-in required: {0}")]
    SignInRequired(ConnectionResult),
    #[error("sign-in failed: {0}")]
    SignInFailed(ConnectionResult),
    /// Any other connection failure.
    #[error("connection failed: {0}")]
    Connect(ConnectionResult),
    /// Play Services is missing or older than required.
    #[error("Google Play services not available ({code}): {message}")]
    NotAvailable { code: i32, message: String },
    #[error("network not connected")]
    NetworkNotConnected,
    #[error("Firebase auth failed: {0}")]
    FirebaseAuthFailed(String),
}

impl PlayServiceError {
    /// Maps a failed connection to its error kind.
    pub fn from_connection_result(result: ConnectionResult) -> Self {
        match result.error_code {
            ConnectionResult::DEVELOPER_ERROR => Self::DeveloperImplementFailed(result),
            ConnectionResult::SIGN_IN_REQUIRED => Self::SignInRequired(result),
            ConnectionResult::SIGN_IN_FAILED => Self::SignInFailed(result),
            _ => Self::Connect(result),
        }
    }

    /// The service's report, for errors that carry one.
    pub fn connection_result(&self) -> Option<&ConnectionResult> {
        match self {
            Self::DeveloperImplementFailed(result)
            | Self::SignInRequired(result)
            | Self::SignInFailed(result)
            | Self::Connect(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_sign_in_error(&self) -> bool {
        matches!(self, Self::SignInRequired(_) | Self::SignInFailed(_))
    }
}
