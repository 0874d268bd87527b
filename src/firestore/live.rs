use super::models::{ListenResponse, TargetChangeType};
use super::{DocumentReference, DocumentSnapshot, FirestoreError};
use crate::observable::{LiveSource, LiveValue, Publisher};
use futures::StreamExt;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Observable snapshot of one document.
pub type LiveDocumentSnapshot = LiveValue<DocumentSnapshot>;

struct DocumentListener {
    reference: DocumentReference,
    registration: Mutex<Option<CancellationToken>>,
}

/// Turns one listen message into the snapshot it implies, if any.
///
/// A target that becomes `CURRENT` without having delivered the document means the document
/// does not exist.
fn snapshot_from(
    reference: &DocumentReference,
    response: ListenResponse,
    delivered: &mut bool,
) -> Option<DocumentSnapshot> {
    if let Some(change) = response.document_change {
        *delivered = true;
        if change.removed_target_ids.is_empty() {
            return Some(reference.snapshot(Some(change.document), None));
        }
        return Some(reference.snapshot(None, None));
    }
    if let Some(delete) = response.document_delete.or(response.document_remove) {
        *delivered = true;
        return Some(reference.snapshot(None, delete.read_time));
    }
    match response.target_change {
        Some(change) if change.target_change_type == TargetChangeType::Current && !*delivered => {
            *delivered = true;
            Some(reference.snapshot(None, change.read_time))
        }
        _ => None,
    }
}

async fn follow(
    reference: &DocumentReference,
    publisher: &Publisher<DocumentSnapshot>,
) -> Result<(), FirestoreError> {
    let mut stream = reference.listen().await?;
    let mut delivered = false;
    while let Some(response) = stream.next().await {
        if let Some(snapshot) = snapshot_from(reference, response?, &mut delivered) {
            publisher.publish(snapshot);
        }
    }
    Ok(())
}

impl LiveSource<DocumentSnapshot> for DocumentListener {
    fn on_active(&self, publisher: Publisher<DocumentSnapshot>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("LiveDocumentSnapshot observed outside of a tokio runtime; no updates will be delivered");
            return;
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let reference = self.reference.clone();
        debug!(document = %reference.path(), "Snapshot listener registered");
        runtime.spawn(async move {
            loop {
                let result = tokio::select! {
                    _ = token.cancelled() => return,
                    result = follow(&reference, &publisher) => result,
                };
                match result {
                    Ok(()) => debug!(document = %reference.path(), "Listen stream closed, reconnecting"),
                    Err(e) => warn!(document = %reference.path(), error = %e, "Listen stream failed, reconnecting"),
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
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
            debug!(document = %self.reference.path(), "Snapshot listener removed");
            cancel.cancel();
        }
    }
}

impl DocumentReference {
    /// Creates an observable snapshot of this document.
    ///
    /// A one-shot read is started immediately and seeds the value unless the listener delivered
    /// one first. Each call creates an independent instance.
    pub fn to_live(&self) -> LiveDocumentSnapshot {
        let live = LiveValue::new(DocumentListener {
            reference: self.clone(),
            registration: Mutex::new(None),
        });

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let reference = self.clone();
            let publisher = live.publisher();
            runtime.spawn(async move {
                match reference.get().await {
                    Ok(snapshot) => {
                        if publisher.current().is_none() {
                            publisher.publish(snapshot);
                        }
                    }
                    Err(e) => warn!(document = %reference.path(), error = %e, "Initial document read failed"),
                }
            });
        }
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::FirebaseFirestore;
    use reqwest_middleware::ClientBuilder;
    use serde_json::json;

    fn reference() -> DocumentReference {
        let client = ClientBuilder::new(reqwest::Client::new()).build();
        FirebaseFirestore::new(client, "http://localhost/v1", "p").doc("users/alice")
    }

    fn response(value: serde_json::Value) -> ListenResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_current_without_document_means_missing() {
        let reference = reference();
        let mut delivered = false;

        let add = response(json!({ "targetChange": { "targetChangeType": "ADD", "targetIds": [1] } }));
        assert!(snapshot_from(&reference, add, &mut delivered).is_none());

        let current = response(json!({ "targetChange": { "targetChangeType": "CURRENT", "targetIds": [1] } }));
        let snapshot = snapshot_from(&reference, current, &mut delivered).unwrap();
        assert!(!snapshot.exists());
        assert_eq!(snapshot.id(), "alice");

        let again = response(json!({ "targetChange": { "targetChangeType": "CURRENT" } }));
        assert!(snapshot_from(&reference, again, &mut delivered).is_none());
    }

    #[test]
    fn test_document_change_and_delete() {
        let reference = reference();
        let mut delivered = false;

        let change = response(json!({
            "documentChange": {
                "document": {
                    "name": "projects/p/databases/(default)/documents/users/alice",
                    "fields": { "name": { "stringValue": "Alice" } }
                },
                "targetIds": [1]
            }
        }));
        let snapshot = snapshot_from(&reference, change, &mut delivered).unwrap();
        assert!(snapshot.exists());
        assert_eq!(snapshot.get_field::<String>("name").unwrap().as_deref(), Some("Alice"));

        let delete = response(json!({
            "documentDelete": { "document": "projects/p/databases/(default)/documents/users/alice" }
        }));
        assert!(!snapshot_from(&reference, delete, &mut delivered).unwrap().exists());
    }
}
