use super::{FirebaseAuth, FirebaseUser, IdToken};
use crate::observable::{LiveSource, LiveValue, Publisher};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Firebase Auth state at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub user: Option<FirebaseUser>,
    pub token: Option<IdToken>,
    /// When the snapshot was taken.
    pub date: DateTime<Utc>,
}

/// Observable auth state of one [`FirebaseAuth`].
pub type LiveFirebaseAuth = LiveValue<AuthSnapshot>;

struct AuthListener {
    auth: Weak<FirebaseAuth>,
    registration: Mutex<Option<CancellationToken>>,
}

async fn publish_current(auth: &FirebaseAuth, publisher: &Publisher<AuthSnapshot>) {
    let snapshot = match auth.current_user() {
        None => AuthSnapshot {
            user: None,
            token: None,
            date: Utc::now(),
        },
        Some(user) => {
            let token = match auth.get_id_token(false).await {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(uid = %user.uid, error = %e, "Failed to read ID token");
                    None
                }
            };
            AuthSnapshot {
                user: auth.current_user(),
                token,
                date: Utc::now(),
            }
        }
    };
    publisher.publish(snapshot);
}

impl LiveSource<AuthSnapshot> for AuthListener {
    fn on_active(&self, publisher: Publisher<AuthSnapshot>) {
        let Some(auth) = self.auth.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("LiveFirebaseAuth observed outside of a tokio runtime; no updates will be delivered");
            return;
        };

        let cancel = CancellationToken::new();
        let mut users = auth.auth_state_changes();
        let mut tokens = auth.id_token_changes();
        let token = cancel.clone();
        debug!("Auth listeners registered");
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = users.changed() => if changed.is_err() { break },
                    changed = tokens.changed() => if changed.is_err() { break },
                }
                users.borrow_and_update();
                tokens.borrow_and_update();
                publish_current(&auth, &publisher).await;
            }
        });

        let previous = self
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(cancel);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn on_inactive(&self) {
        if let Some(cancel) = self
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            debug!("Auth listeners removed");
            cancel.cancel();
        }
    }
}

impl FirebaseAuth {
    /// Converts this handle into its observable counterpart.
    ///
    /// All calls on the same handle share one [`LiveFirebaseAuth`]. Each call also schedules a
    /// refresh of the published snapshot.
    pub fn to_live(self: &Arc<Self>) -> LiveFirebaseAuth {
        let live = self
            .live
            .get_or_init(|| {
                LiveValue::new(AuthListener {
                    auth: Arc::downgrade(self),
                    registration: Mutex::new(None),
                })
            })
            .clone();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let auth = self.clone();
            let publisher = live.publisher();
            runtime.spawn(async move {
                publish_current(&auth, &publisher).await;
            });
        }
        live
    }
}
