use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignUpRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    pub return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInWithPasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInWithCustomTokenRequest<'a> {
    pub token: &'a str,
    pub return_secure_token: bool,
}

/// Response shared by the `accounts:signUp`, `accounts:signInWithPassword` and
/// `accounts:signInWithCustomToken` endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInResponse {
    pub id_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Response of the Secure Token `token` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshTokenResponse {
    pub id_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Parses the `expiresIn` field, a number of seconds sent as a string.
pub(crate) fn parse_expires_in(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim_end_matches('s').parse().ok())
        .unwrap_or(3600)
}
