//! Session State Controller
//!
//! Single source of truth for authentication state. Every write goes through
//! [`SessionController::restore`], [`SessionController::sign_in`] or
//! [`SessionController::sign_out`]; everything else reads snapshots.

use edulink_core::{
    log_operation_start, log_operation_success, validation_error, EdulinkResult,
    KeyValueStore, Role, Session, SessionState, ROLE_KEY, SESSION_KEYS, TOKEN_KEY, USER_ID_KEY,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

type Callback = Arc<dyn Fn(&Session) + Send + Sync>;
type SubscriberList = Mutex<Vec<(u64, Callback)>>;

/// Owner of the process-wide [`Session`]
///
/// The controller is an ordinary value: construct it once, wrap it in an
/// `Arc` and hand it to whoever needs to read or change the session.
///
/// Operations are serialized: a `sign_out` issued while a `restore` is still
/// reading the store waits for the restore to finish and then applies, so the
/// last operation issued is the one whose result remains.
pub struct SessionController {
    store: Arc<dyn KeyValueStore>,
    session: RwLock<Session>,
    subscribers: Arc<SubscriberList>,
    next_subscriber_id: AtomicU64,
    watch_tx: watch::Sender<Session>,
    operation_lock: tokio::sync::Mutex<()>,
}

impl SessionController {
    /// Create a controller in the `Bootstrapping` state
    ///
    /// Nothing is read from the store until [`restore`](Self::restore) runs.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (watch_tx, _) = watch::channel(Session::bootstrapping());

        Self {
            store,
            session: RwLock::new(Session::bootstrapping()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(0),
            watch_tx,
            operation_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a controller and restore the persisted session before returning it
    pub async fn bootstrap(store: Arc<dyn KeyValueStore>) -> Self {
        let controller = Self::new(store);
        controller.restore().await;
        controller
    }

    /// Current session snapshot
    pub fn snapshot(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot().state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_authenticated()
    }

    /// Register a callback invoked synchronously, once per transition, with the new snapshot
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        debug!(subscriber_id = id, "Session subscriber registered");

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Receiver that always holds the latest snapshot, for async consumers
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.watch_tx.subscribe()
    }

    /// Number of live callback subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Rebuild the session from the persisted keys
    ///
    /// The result is authenticated only when a non-empty token and a known
    /// role were stored. A failing read is logged and treated as "signed
    /// out"; this never leaves the controller in `Bootstrapping`.
    pub async fn restore(&self) -> Session {
        let _guard = self.operation_lock.lock().await;
        log_operation_start!("restore_session");

        let [token, role, user_id] = SESSION_KEYS.map(|key| self.store.get(key));
        let (token, role, user_id) = futures::join!(token, role, user_id);

        let restored = match (token, role, user_id) {
            (Ok(token), Ok(role), Ok(user_id)) => session_from_stored(token, role, user_id),
            (token, role, user_id) => {
                for error in [token.err(), role.err(), user_id.err()]
                    .into_iter()
                    .flatten()
                {
                    error.log();
                }
                warn!("Could not read the persisted session, continuing signed out");
                Session::unauthenticated()
            }
        };

        self.publish(restored.clone());
        log_operation_success!("restore_session", state = %restored.state());
        restored
    }

    /// Record a successful credential exchange
    ///
    /// The role is stored as given; checking that it is one the application
    /// knows is up to the caller, and an unknown role simply routes to the
    /// unauthenticated screens. All three keys are written before the
    /// in-memory session changes, but a failed write does not stop the
    /// transition.
    ///
    /// Returns an error only for an empty token, before anything is touched.
    pub async fn sign_in(
        &self,
        token: impl Into<String>,
        role: impl Into<Role>,
        user_id: Option<String>,
    ) -> EdulinkResult<Session> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(validation_error!(
                "Cannot sign in with an empty token",
                "token",
                "session_controller"
            ));
        }
        let role = role.into();

        let _guard = self.operation_lock.lock().await;
        log_operation_start!("sign_in", role = %role, user_id = ?user_id);

        // A missing user id must not leave the previous user's id behind
        let write_user_id = async {
            match &user_id {
                Some(id) => self.store.set(USER_ID_KEY, id).await,
                None => self.store.remove(USER_ID_KEY).await,
            }
        };
        let (token_write, role_write, user_id_write) = futures::join!(
            self.store.set(TOKEN_KEY, &token),
            self.store.set(ROLE_KEY, role.as_str()),
            write_user_id,
        );
        absorb_storage_failures("sign_in", [token_write, role_write, user_id_write]);

        let session = Session::authenticated(token, role, user_id);
        self.publish(session.clone());
        log_operation_success!("sign_in", state = %session.state());
        Ok(session)
    }

    /// Forget the current user, in storage and in memory
    ///
    /// Safe to call when nobody is signed in.
    pub async fn sign_out(&self) -> Session {
        let _guard = self.operation_lock.lock().await;
        log_operation_start!("sign_out");

        let removals =
            futures::future::join_all(SESSION_KEYS.map(|key| self.store.remove(key))).await;
        absorb_storage_failures("sign_out", removals);

        let session = Session::signed_out();
        self.publish(session.clone());
        log_operation_success!("sign_out");
        session
    }

    fn publish(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session.clone();
        self.watch_tx.send_replace(session.clone());

        info!(
            state = %session.state(),
            signing_out = session.is_signing_out(),
            "Session state changed"
        );

        // Callbacks run without the list lock so they may (un)subscribe
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(&session);
        }
    }
}

fn session_from_stored(
    token: Option<String>,
    role: Option<String>,
    user_id: Option<String>,
) -> Session {
    let token = token.filter(|t| !t.trim().is_empty());
    let role = role.map(Role::from).filter(Role::is_known);

    match (token, role) {
        (Some(token), Some(role)) => {
            Session::authenticated(token, role, user_id.filter(|id| !id.is_empty()))
        }
        (Some(_), None) => {
            debug!("Stored token has no usable role, ignoring it");
            Session::unauthenticated()
        }
        _ => Session::unauthenticated(),
    }
}

fn absorb_storage_failures(
    operation: &str,
    results: impl IntoIterator<Item = EdulinkResult<()>>,
) {
    let mut failed = 0;
    for error in results.into_iter().filter_map(Result::err) {
        error.log();
        failed += 1;
    }

    if failed > 0 {
        warn!(
            operation = operation,
            failed_keys = failed,
            "Session keys were only partially persisted; the change will not survive a restart"
        );
    }
}

/// Handle keeping a [`SessionController::subscribe`] callback registered
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberList>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
            debug!(subscriber_id = self.id, "Session subscriber removed");
        }
    }
}
