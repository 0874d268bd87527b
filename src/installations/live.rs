use super::FirebaseInstallations;
use crate::observable::{LiveSource, LiveValue, Publisher};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Observable installation id of one [`FirebaseInstallations`].
pub type LiveInstallationId = LiveValue<String>;

struct InstallationIdPoller {
    installations: Weak<FirebaseInstallations>,
    polling: Mutex<Option<CancellationToken>>,
}

impl LiveSource<String> for InstallationIdPoller {
    fn on_active(&self, publisher: Publisher<String>) {
        if publisher.current().is_some() {
            return;
        }
        let Some(installations) = self.installations.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("LiveInstallationId observed outside of a tokio runtime; no id will be delivered");
            return;
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        runtime.spawn(async move {
            loop {
                let result = tokio::select! {
                    _ = token.cancelled() => return,
                    result = installations.id() => result,
                };
                match result {
                    Ok(id) => {
                        debug!(fid = %id, "Installation id available");
                        publisher.publish(id);
                        return;
                    }
                    Err(e) => warn!(error = %e, "Failed to read installation id, retrying"),
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        });

        let previous = self
            .polling
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(cancel);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn on_inactive(&self) {
        if let Some(cancel) = self.polling.lock().unwrap_or_else(|e| e.into_inner()).take() {
            cancel.cancel();
        }
    }
}

impl FirebaseInstallations {
    /// Converts this handle into its observable counterpart; all calls share one instance.
    pub fn to_live(self: &Arc<Self>) -> LiveInstallationId {
        self.live
            .get_or_init(|| {
                LiveValue::new(InstallationIdPoller {
                    installations: Arc::downgrade(self),
                    polling: Mutex::new(None),
                })
            })
            .clone()
    }
}
