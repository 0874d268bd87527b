use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub(crate) const SDK_VERSION: &str = concat!("armyknife-gms-", env!("CARGO_PKG_VERSION"));

/// Body of the client `namespaces/firebase:fetch` call.
#[derive(Debug, Serialize)]
pub(crate) struct FetchRequest<'a> {
    pub sdk_version: &'a str,
    pub app_instance_id: &'a str,
    pub app_instance_id_token: &'a str,
    pub app_id: &'a str,
    pub language_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FetchResponse {
    #[serde(default)]
    pub entries: Option<HashMap<String, String>>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub template_version: Option<String>,
}

/// What a completed fetch means for the fetched template.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    Updated(HashMap<String, String>),
    Unchanged,
}

impl FetchResponse {
    pub(crate) fn into_outcome(self) -> Result<FetchOutcome, String> {
        match self.state.as_deref() {
            Some("INSTANCE_STATE_UNSPECIFIED") => Err("fetch returned an unspecified state".to_string()),
            Some("NO_CHANGE") => Ok(FetchOutcome::Unchanged),
            Some("NO_TEMPLATE") | Some("EMPTY_CONFIG") => Ok(FetchOutcome::Updated(HashMap::new())),
            _ => Ok(FetchOutcome::Updated(self.entries.unwrap_or_default())),
        }
    }
}
