use crate::models::{FirebaseUser, IdToken, LastFetchStatus, RemoteConfigValue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared by every context in the process.
static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(0);

/// The state of one Firebase app at a point in time.
///
/// Snapshots are never mutated; every change produces a new one with a larger `id`. Two
/// snapshots are equal exactly when their ids are.
#[derive(Debug, Clone)]
pub struct FirebaseContextSnapshot {
    pub id: u64,
    pub date: DateTime<Utc>,
    pub user: Option<FirebaseUser>,
    pub installation_id: Option<String>,
    pub user_auth_token: Option<IdToken>,
    pub remote_config_values: HashMap<String, RemoteConfigValue>,
    pub remote_config_fetch_status: LastFetchStatus,
}

impl FirebaseContextSnapshot {
    pub(crate) fn new(
        user: Option<FirebaseUser>,
        installation_id: Option<String>,
        user_auth_token: Option<IdToken>,
        remote_config_values: HashMap<String, RemoteConfigValue>,
        remote_config_fetch_status: LastFetchStatus,
    ) -> Self {
        Self {
            id: NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::SeqCst),
            date: Utc::now(),
            user,
            installation_id,
            user_auth_token,
            remote_config_values,
            remote_config_fetch_status,
        }
    }

    /// `true` when the last Remote Config fetch succeeded.
    pub fn can_activate_remote_config(&self) -> bool {
        self.remote_config_fetch_status == LastFetchStatus::Success
    }
}

impl PartialEq for FirebaseContextSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FirebaseContextSnapshot {}

impl Hash for FirebaseContextSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for FirebaseContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.remote_config_values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        write!(
            f,
            "FirebaseContextSnapshot(id={}, user='{}', installation_id='{}', user_auth_token={}, remote_config_values={:?})",
            self.id,
            self.user.as_ref().map(|u| u.uid.as_str()).unwrap_or("N/A"),
            self.installation_id.as_deref().unwrap_or("N/A"),
            if self.user_auth_token.is_some() { "present" } else { "absent" },
            keys
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> FirebaseContextSnapshot {
        FirebaseContextSnapshot::new(None, None, None, HashMap::new(), LastFetchStatus::NoFetchYet)
    }

    #[test]
    fn test_ids_increase() {
        let first = empty();
        let second = empty();
        assert!(second.id > first.id);
        assert_ne!(first, second);
        assert_eq!(first.clone(), first);
    }

    #[test]
    fn test_display() {
        let mut values = HashMap::new();
        values.insert(
            "b".to_string(),
            RemoteConfigValue { value: "2".into(), source: crate::models::ValueSource::Remote },
        );
        values.insert(
            "a".to_string(),
            RemoteConfigValue { value: "1".into(), source: crate::models::ValueSource::Remote },
        );
        let user = FirebaseUser {
            uid: "uid-1".into(),
            email: None,
            display_name: None,
            is_anonymous: true,
        };
        let snapshot = FirebaseContextSnapshot::new(
            Some(user),
            Some("fid".into()),
            None,
            values,
            LastFetchStatus::Success,
        );
        assert!(snapshot.can_activate_remote_config());
        assert_eq!(
            snapshot.to_string(),
            format!(
                "FirebaseContextSnapshot(id={}, user='uid-1', installation_id='fid', user_auth_token=absent, remote_config_values=[\"a\", \"b\"])",
                snapshot.id
            )
        );
        assert!(!empty().can_activate_remote_config());
    }
}
