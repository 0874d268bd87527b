//! Google Play Services connection helpers.
//!
//! The platform client is reached through the [`ApiClient`] trait: a connection is started with
//! [`connect`], which waits for the first callback and turns failures into [`PlayServiceError`]s,
//! and [`use_client`] guarantees the client is disconnected however the work finishes.

pub mod error;


pub use error::{ConnectionResult, PlayServiceError};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Package name of Google Play services.
pub const PLAY_SERVICES_PACKAGE: &str = "com.google.android.gms";

/// How a connection treats sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInMode {
    /// The connection fails unless the user signs in.
    Required,
    /// Sign-in is offered but not needed to connect.
    Optional,
    /// The client's own default.
    Default,
}

/// Callback delivered by an [`ApiClient`] while connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    /// The connection was suspended; carries the cause code.
    Suspended(i32),
    Failed(ConnectionResult),
}

/// Sink for the connection callbacks of one attempt.
///
/// Only the first event is delivered; later ones are dropped.
#[derive(Debug, Clone)]
pub struct ConnectionCallbacks {
    sender: mpsc::Sender<ConnectionEvent>,
}

impl ConnectionCallbacks {
    fn send(&self, event: ConnectionEvent) {
        if self.sender.try_send(event).is_err() {
            debug!("Connection event dropped; an earlier one is pending");
        }
    }

    pub fn on_connected(&self) {
        self.send(ConnectionEvent::Connected);
    }

    pub fn on_connection_suspended(&self, cause: i32) {
        self.send(ConnectionEvent::Suspended(cause));
    }

    pub fn on_connection_failed(&self, result: ConnectionResult) {
        self.send(ConnectionEvent::Failed(result));
    }
}

/// A Play Services API client.
pub trait ApiClient: Send + Sync {
    fn register_callbacks(&self, callbacks: ConnectionCallbacks);
    fn unregister_callbacks(&self);
    /// Starts connecting; the outcome arrives through the registered callbacks.
    fn connect(&self, mode: SignInMode);
    fn disconnect(&self);
}

/// Unregisters the callbacks when the attempt ends, and disconnects unless it succeeded.
struct PendingConnection<'a, C: ApiClient + ?Sized> {
    client: &'a C,
    connected: bool,
}

impl<C: ApiClient + ?Sized> Drop for PendingConnection<'_, C> {
    fn drop(&mut self) {
        if !self.connected {
            self.client.disconnect();
        }
        self.client.unregister_callbacks();
    }
}

async fn connect_once<C: ApiClient + ?Sized>(
    client: &C,
    mode: SignInMode,
) -> Result<(), PlayServiceError> {
    let (sender, mut receiver) = mpsc::channel(1);
    client.register_callbacks(ConnectionCallbacks { sender });
    let mut pending = PendingConnection {
        client,
        connected: false,
    };

    client.connect(mode);
    match receiver.recv().await {
        Some(ConnectionEvent::Connected) => {
            pending.connected = true;
            Ok(())
        }
        Some(ConnectionEvent::Suspended(cause)) => Err(PlayServiceError::RequireRetryConnect(cause)),
        Some(ConnectionEvent::Failed(result)) => Err(PlayServiceError::from_connection_result(result)),
        None => Err(PlayServiceError::Connect(
            ConnectionResult::new(ConnectionResult::INTERNAL_ERROR)
                .with_message("client dropped the connection callbacks"),
        )),
    }
}

/// Connects `client` and waits for the outcome.
///
/// On success the connection stays open. On failure the client is disconnected; with
/// [`SignInMode::Required`] or [`SignInMode::Optional`] the attempt is then repeated once in
/// optional mode. Dropping the returned future disconnects the client and retries nothing.
pub async fn connect<C: ApiClient + ?Sized>(
    client: &C,
    mode: SignInMode,
) -> Result<(), PlayServiceError> {
    match mode {
        SignInMode::Required | SignInMode::Optional => match connect_once(client, mode).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, ?mode, "Connection failed, retrying with optional sign-in");
                connect_once(client, SignInMode::Optional).await
            }
        },
        SignInMode::Default => connect_once(client, mode).await,
    }
}

struct DisconnectGuard<C: ApiClient + ?Sized>(Arc<C>);

impl<C: ApiClient + ?Sized> Drop for DisconnectGuard<C> {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}

/// Runs `action` with `client` and disconnects the client afterwards, also when the action
/// panics or the returned future is dropped.
pub async fn use_client<C, F, Fut, T>(client: Arc<C>, action: F) -> T
where
    C: ApiClient + ?Sized,
    F: FnOnce(Arc<C>) -> Fut,
    Fut: Future<Output = T>,
{
    let _guard = DisconnectGuard(client.clone());
    action(client).await
}

/// Availability check of the installed Play services.
pub trait ApiAvailability {
    /// [`ConnectionResult::SUCCESS`] when a recent enough version is installed, otherwise the
    /// reason it is not usable.
    fn is_available(&self) -> i32;

    fn error_string(&self, code: i32) -> String {
        ConnectionResult::code_name(code)
    }
}

pub fn is_installed_require_version(availability: &dyn ApiAvailability) -> bool {
    availability.is_available() == ConnectionResult::SUCCESS
}

pub fn assert_installed_require_version(
    availability: &dyn ApiAvailability,
) -> Result<(), PlayServiceError> {
    let code = availability.is_available();
    if code == ConnectionResult::SUCCESS {
        return Ok(());
    }
    Err(PlayServiceError::NotAvailable {
        code,
        message: availability.error_string(code),
    })
}

/// Store link that installs `package_name` from Google Play.
pub fn google_play_install_url(package_name: &str) -> String {
    format!("market://details?id={}", package_name)
}

/// Store link that installs Google Play services.
pub fn google_play_service_install_url() -> String {
    google_play_install_url(PLAY_SERVICES_PACKAGE)
}
