//! Live snapshot of a Firebase app's client state.
//!
//! A [`FirebaseContext`] combines the signed-in user, their ID token, the installation id and
//! the active Remote Config values into one [`FirebaseContextSnapshot`] and republishes it
//! whenever any of them changes.
//!
//! All mutable state is owned by a single actor task. The background loops (auth state, token
//! refresh, Remote Config, installation id) only send events to it, so a published snapshot is
//! always complete. Every task hangs off one root [`CancellationToken`]; [`FirebaseContext::close`]
//! cancels it and joins the tasks.

pub mod settings;
pub mod snapshot;
pub mod source;


pub use settings::ContextSettings;
pub use snapshot::FirebaseContextSnapshot;
pub use source::{AuthSource, InstallationSource, RemoteConfigSource};

use crate::models::{FirebaseUser, IdToken, LastFetchStatus};
use crate::observable::{LiveValue, Publisher, Subscription};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("refresh interval must be greater than zero")]
    InvalidInterval,
    #[error("a Tokio runtime is required to start a FirebaseContext")]
    NoRuntime,
}

/// Contexts by app name, as kept by the registry.
pub(crate) type ContextMap = Mutex<HashMap<String, Arc<FirebaseContext>>>;

/// The services a context reads. Any of them may be absent.
#[derive(Clone, Default)]
pub struct ContextSources {
    pub auth: Option<Arc<dyn AuthSource>>,
    pub installations: Option<Arc<dyn InstallationSource>>,
    pub remote_config: Option<Arc<dyn RemoteConfigSource>>,
}

#[derive(Debug)]
enum ContextEvent {
    AuthChanged(Option<FirebaseUser>),
    TokenRefreshed { generation: u64, token: IdToken },
    InstallationId(String),
    RemoteConfigUpdated,
    Refresh,
}

/// Runs `future` unless `cancel` fires first.
async fn or_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

/// Sleeps for `duration`; `false` when cancelled meanwhile.
async fn sleep_or_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    or_cancelled(cancel, tokio::time::sleep(duration)).await.is_some()
}

struct TokenLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the context state and the only producer of snapshots.
struct ContextActor {
    auth: Option<Arc<dyn AuthSource>>,
    remote_config: Option<Arc<dyn RemoteConfigSource>>,
    settings: ContextSettings,
    events: mpsc::UnboundedSender<ContextEvent>,
    publisher: Publisher<FirebaseContextSnapshot>,
    cancel: CancellationToken,
    user: Option<FirebaseUser>,
    token: Option<IdToken>,
    installation_id: Option<String>,
    generation: u64,
    token_loop: Option<TokenLoop>,
    stopped_token_loops: Vec<JoinHandle<()>>,
}

impl ContextActor {
    fn emit(&self) {
        let (values, status) = match &self.remote_config {
            Some(remote_config) => (remote_config.values(), remote_config.last_fetch_status()),
            None => (HashMap::new(), LastFetchStatus::NoFetchYet),
        };
        let snapshot = FirebaseContextSnapshot::new(
            self.user.clone(),
            self.installation_id.clone(),
            self.token.clone(),
            values,
            status,
        );
        debug!(id = snapshot.id, date = %snapshot.date, "Snapshot published");
        self.publisher.publish(snapshot);
    }

    fn handle(&mut self, event: ContextEvent) {
        match event {
            ContextEvent::AuthChanged(user) => self.on_auth_changed(user),
            ContextEvent::TokenRefreshed { generation, token } => {
                if generation != self.generation || self.user.is_none() {
                    debug!(generation, "Dropped token of a previous sign-in");
                    return;
                }
                self.token = Some(token);
                self.emit();
            }
            ContextEvent::InstallationId(id) => {
                self.installation_id = Some(id);
                self.emit();
            }
            ContextEvent::RemoteConfigUpdated | ContextEvent::Refresh => self.emit(),
        }
    }

    fn on_auth_changed(&mut self, user: Option<FirebaseUser>) {
        let previous = self.user.as_ref().map(|u| u.uid.clone());
        let current = user.as_ref().map(|u| u.uid.clone());

        if previous != current {
            self.stop_token_loop();
            self.token = None;
            self.generation += 1;
            match (&previous, &current) {
                (None, Some(uid)) => info!(uid = %uid, "User signed in"),
                (Some(uid), None) => info!(uid = %uid, "User signed out"),
                (Some(old), Some(new)) => info!(from = %old, to = %new, "User switched"),
                (None, None) => {}
            }
        }
        self.user = user;
        if current.is_some() && self.token_loop.is_none() {
            self.start_token_loop();
        }
        self.emit();
    }

    fn start_token_loop(&mut self) {
        let Some(auth) = self.auth.clone() else {
            return;
        };
        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(
            refresh_tokens(
                auth,
                self.generation,
                self.settings,
                self.events.clone(),
                cancel.clone(),
            )
            .in_current_span(),
        );
        self.token_loop = Some(TokenLoop { cancel, handle });
    }

    fn stop_token_loop(&mut self) {
        if let Some(token_loop) = self.token_loop.take() {
            token_loop.cancel.cancel();
            self.stopped_token_loops.retain(|handle| !handle.is_finished());
            self.stopped_token_loops.push(token_loop.handle);
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<ContextEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
        }

        self.stop_token_loop();
        for handle in self.stopped_token_loops.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Token refresh loop ended abnormally");
            }
        }
        debug!("Context actor stopped");
    }
}

async fn watch_auth(
    auth: Arc<dyn AuthSource>,
    events: mpsc::UnboundedSender<ContextEvent>,
    cancel: CancellationToken,
) {
    let mut changes = auth.auth_state_changes();
    loop {
        let user = changes.borrow_and_update().clone();
        if events.send(ContextEvent::AuthChanged(user)).is_err() {
            break;
        }
        match or_cancelled(&cancel, changes.changed()).await {
            Some(Ok(())) => {}
            Some(Err(_)) | None => break,
        }
    }
}

async fn refresh_tokens(
    auth: Arc<dyn AuthSource>,
    generation: u64,
    settings: ContextSettings,
    events: mpsc::UnboundedSender<ContextEvent>,
    cancel: CancellationToken,
) {
    loop {
        let Some(result) = or_cancelled(&cancel, auth.refresh_token()).await else {
            break;
        };
        let delay = match result {
            Ok(token) => {
                info!("User token refreshed");
                if events
                    .send(ContextEvent::TokenRefreshed { generation, token })
                    .is_err()
                {
                    break;
                }
                settings.token_refresh_interval
            }
            Err(e) => {
                warn!(error = %e, "User token refresh failed");
                settings.token_retry_delay
            }
        };
        if !sleep_or_cancelled(&cancel, delay).await {
            break;
        }
    }
}

async fn refresh_remote_config(
    remote_config: Arc<dyn RemoteConfigSource>,
    intervals: watch::Receiver<Duration>,
    events: mpsc::UnboundedSender<ContextEvent>,
    cancel: CancellationToken,
) {
    loop {
        let interval = *intervals.borrow();
        debug!(?interval, "Remote Config fetch");
        let Some(result) = or_cancelled(&cancel, remote_config.refresh(interval)).await else {
            break;
        };
        match result {
            Ok(()) => {
                if events.send(ContextEvent::RemoteConfigUpdated).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Remote Config fetch failed"),
        }
        if !sleep_or_cancelled(&cancel, interval).await {
            break;
        }
    }
}

async fn resolve_installation_id(
    installations: Arc<dyn InstallationSource>,
    retry_delay: Duration,
    events: mpsc::UnboundedSender<ContextEvent>,
    cancel: CancellationToken,
) {
    loop {
        let Some(result) = or_cancelled(&cancel, installations.installation_id()).await else {
            break;
        };
        match result {
            Ok(id) => {
                debug!(fid = %id, "Installation id resolved");
                let _ = events.send(ContextEvent::InstallationId(id));
                break;
            }
            Err(e) => warn!(error = %e, "Installation id lookup failed"),
        }
        if retry_delay.is_zero() {
            tokio::task::yield_now().await;
        } else if !sleep_or_cancelled(&cancel, retry_delay).await {
            break;
        }
    }
}

/// Observable state of one Firebase app.
///
/// Obtained through [`Firebase::context`](crate::Firebase::context), or built directly from
/// arbitrary sources with [`FirebaseContext::start`]. The background loops run from
/// construction until [`FirebaseContext::close`] or drop.
pub struct FirebaseContext {
    name: String,
    live: LiveValue<FirebaseContextSnapshot>,
    events: mpsc::UnboundedSender<ContextEvent>,
    remote_config_interval: watch::Sender<Duration>,
    remote_config: Option<Arc<dyn RemoteConfigSource>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    registry: Option<Weak<ContextMap>>,
}

impl FirebaseContext {
    /// Starts a context over `sources`. Must be called within a Tokio runtime.
    pub fn start(
        name: &str,
        sources: ContextSources,
        settings: ContextSettings,
    ) -> Result<Arc<Self>, ContextError> {
        Self::start_in(name, sources, settings, None)
    }

    pub(crate) fn start_in(
        name: &str,
        sources: ContextSources,
        settings: ContextSettings,
        registry: Option<Weak<ContextMap>>,
    ) -> Result<Arc<Self>, ContextError> {
        if settings.remote_config_refresh_interval.is_zero() {
            return Err(ContextError::InvalidInterval);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ContextError::NoRuntime)?;

        let span = info_span!("FirebaseContext", name = %name);
        let _entered = span.enter();

        let live = LiveValue::detached();
        let (events, receiver) = mpsc::unbounded_channel();
        let (remote_config_interval, intervals) =
            watch::channel(settings.remote_config_refresh_interval);
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let actor = ContextActor {
            auth: sources.auth.clone(),
            remote_config: sources.remote_config.clone(),
            settings,
            events: events.clone(),
            publisher: live.publisher(),
            cancel: cancel.child_token(),
            user: None,
            token: None,
            installation_id: None,
            generation: 0,
            token_loop: None,
            stopped_token_loops: Vec::new(),
        };
        actor.emit();
        tasks.push(runtime.spawn(actor.run(receiver).in_current_span()));

        match sources.auth {
            Some(auth) => tasks.push(runtime.spawn(
                watch_auth(auth, events.clone(), cancel.child_token()).in_current_span(),
            )),
            None => debug!("Auth not available"),
        }
        match sources.remote_config.clone() {
            Some(remote_config) => tasks.push(runtime.spawn(
                refresh_remote_config(remote_config, intervals, events.clone(), cancel.child_token())
                    .in_current_span(),
            )),
            None => debug!("Remote Config not available"),
        }
        match sources.installations {
            Some(installations) => tasks.push(runtime.spawn(
                resolve_installation_id(
                    installations,
                    settings.installation_retry_delay,
                    events.clone(),
                    cancel.child_token(),
                )
                .in_current_span(),
            )),
            None => debug!("Installations not available"),
        }
        info!("FirebaseContext started");

        Ok(Arc::new(Self {
            name: name.to_string(),
            live,
            events,
            remote_config_interval,
            remote_config: sources.remote_config,
            cancel,
            tasks: Mutex::new(tasks),
            registry,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name == crate::DEFAULT_APP_NAME
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> Option<Arc<FirebaseContextSnapshot>> {
        self.live.value()
    }

    pub fn subscribe(&self) -> Subscription<FirebaseContextSnapshot> {
        self.live.subscribe()
    }

    pub fn live(&self) -> LiveValue<FirebaseContextSnapshot> {
        self.live.clone()
    }

    /// Publishes a fresh snapshot of the current state.
    pub fn refresh(&self) {
        if self.events.send(ContextEvent::Refresh).is_err() {
            debug!(name = %self.name, "Refresh ignored, context closed");
        }
    }

    pub fn remote_config_refresh_interval(&self) -> Duration {
        *self.remote_config_interval.borrow()
    }

    /// Changes the Remote Config interval, used from the next fetch on.
    pub fn set_remote_config_refresh_interval(&self, interval: Duration) -> Result<(), ContextError> {
        if interval.is_zero() {
            return Err(ContextError::InvalidInterval);
        }
        self.remote_config_interval.send_replace(interval);
        Ok(())
    }

    /// Activates the fetched Remote Config values if the latest snapshot saw a successful fetch.
    ///
    /// Returns `None` when nothing can be activated, otherwise whether the active values
    /// changed. A change publishes a new snapshot.
    pub fn activate_remote_config_if_fetched(&self) -> Option<bool> {
        if !self.snapshot()?.can_activate_remote_config() {
            return None;
        }
        let activated = self.remote_config.as_ref()?.activate();
        if activated {
            self.refresh();
        }
        Some(activated)
    }

    /// Stops every background task, waits for them and removes this context from its registry.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.evict();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(name = %self.name, error = %e, "Context task ended abnormally");
            }
        }
        info!(name = %self.name, "FirebaseContext closed");
    }

    fn evict(&self) {
        let Some(registry) = self.registry.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let mut contexts = registry.lock().unwrap_or_else(|e| e.into_inner());
        let registered = contexts
            .get(&self.name)
            .is_some_and(|context| std::ptr::eq(Arc::as_ptr(context), self));
        if registered {
            contexts.remove(&self.name);
        }
    }
}

impl Drop for FirebaseContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Display for FirebaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FirebaseContext(name='{}')", self.name)
    }
}

impl fmt::Debug for FirebaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseContext")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
