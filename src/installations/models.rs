use serde::{Deserialize, Serialize};

pub(crate) const AUTH_VERSION: &str = "FIS_v2";
pub(crate) const SDK_VERSION: &str = concat!("r:", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateInstallationRequest<'a> {
    pub fid: &'a str,
    pub auth_version: &'a str,
    pub app_id: &'a str,
    pub sdk_version: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateInstallationResponse {
    #[serde(default)]
    pub fid: Option<String>,
    pub refresh_token: String,
    pub auth_token: TokenResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenResponse {
    pub token: String,
    /// Lifetime such as `"604800s"`.
    pub expires_in: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateAuthTokenRequest<'a> {
    pub installation: InstallationInfo<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallationInfo<'a> {
    pub sdk_version: &'a str,
}

/// Parses a protobuf JSON duration (`"3600s"`, `"1.5s"`) into whole seconds.
pub(crate) fn parse_duration_secs(raw: &str) -> i64 {
    raw.trim_end_matches('s')
        .parse::<f64>()
        .map(|secs| secs as i64)
        .unwrap_or(0)
}
