//! Process-wide session state with subscribe/notify.
//!
//! [`SessionStore`] is the single owned instance of "who is signed in".
//! Observers either watch the whole [`SessionState`] (UI re-render) or
//! listen for [`SessionEvent`]s (side effects such as push registration).

mod route;

pub use route::{Navigator, NoopNavigator, Route};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::auth::user::AuthenticatedUser;
use crate::error::SessionError;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 32;

/// Snapshot of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// `None` means signed out.
    pub user: Option<AuthenticatedUser>,
    /// A session-affecting operation is in flight.
    pub is_loading: bool,
    pub last_error: Option<SessionError>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// How a user came to be signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOrigin {
    Restore,
    Credentials,
    Registration,
    OAuth,
}

/// Session transitions broadcast to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn {
        user: AuthenticatedUser,
        origin: SignInOrigin,
    },
    /// Explicit sign-out.
    SignedOut,
    /// Credentials were rejected and torn down.
    Invalidated,
}

struct Inner {
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    loading: AtomicUsize,
}

/// Owner of the live session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state,
                events,
                loading: AtomicUsize::new(0),
            }),
        }
    }

    // MARK: - Observation

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn user(&self) -> Option<AuthenticatedUser> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.inner.state.borrow().last_error.clone()
    }

    /// Watch the full state. The receiver sees the latest value on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Receive session transitions from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Routing decision for the current state.
    pub fn route(&self) -> Route {
        Route::for_state(&self.inner.state.borrow())
    }

    // MARK: - Loading

    /// Mark a session-affecting operation as in flight.
    ///
    /// `is_loading` stays true until every outstanding guard is dropped, on
    /// every exit path of the operation that holds it.
    pub fn begin_loading(&self) -> LoadingGuard {
        if self.inner.loading.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.state.send_modify(|s| s.is_loading = true);
        }
        LoadingGuard {
            store: self.clone(),
        }
    }

    // MARK: - Mutation

    /// Install a newly authenticated user and announce it.
    pub fn sign_in(&self, user: AuthenticatedUser, origin: SignInOrigin) {
        debug!(email = %user.email, ?origin, "Session signed in");
        self.inner.state.send_modify(|s| {
            s.user = Some(user.clone());
            s.last_error = None;
        });
        let _ = self.inner.events.send(SessionEvent::SignedIn { user, origin });
    }

    /// Replace the user without announcing a sign-in (identity refresh,
    /// offline restore).
    pub fn set_user(&self, user: Option<AuthenticatedUser>) {
        self.inner.state.send_modify(|s| s.user = user);
    }

    /// Clear the user after an explicit sign-out.
    pub fn sign_out(&self) {
        self.inner.state.send_modify(|s| {
            s.user = None;
            s.last_error = None;
        });
        let _ = self.inner.events.send(SessionEvent::SignedOut);
    }

    /// Clear the user after credentials were rejected.
    pub fn invalidate(&self, reason: Option<SessionError>) {
        self.inner.state.send_modify(|s| {
            s.user = None;
            if reason.is_some() {
                s.last_error = reason;
            }
        });
        let _ = self.inner.events.send(SessionEvent::Invalidated);
    }

    pub fn set_error(&self, error: SessionError) {
        self.inner.state.send_modify(|s| s.last_error = Some(error));
    }

    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|s| s.last_error.take().is_some());
    }

    /// Flip `onboarding_completed` to true on the current user.
    ///
    /// Returns `false` when nobody is signed in. The flag never goes back to
    /// false within a session.
    pub fn mark_onboarding_completed(&self) -> bool {
        self.inner.state.send_if_modified(|s| match s.user.as_mut() {
            Some(user) if !user.onboarding_completed => {
                user.onboarding_completed = true;
                true
            }
            _ => false,
        });
        self.user().is_some_and(|u| u.onboarding_completed)
    }

    /// Patch the display name on the current user. Returns `false` when
    /// nobody is signed in.
    pub fn patch_name(&self, name: &str) -> bool {
        self.inner.state.send_if_modified(|s| match s.user.as_mut() {
            Some(user) => {
                user.name = name.to_string();
                true
            }
            None => false,
        })
    }

    fn end_loading(&self) {
        if self.inner.loading.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.state.send_modify(|s| s.is_loading = false);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

/// Clears `is_loading` when dropped.
#[must_use = "loading ends as soon as the guard is dropped"]
pub struct LoadingGuard {
    store: SessionStore,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.store.end_loading();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            email: email.to_string(),
            name: "Test".to_string(),
            picture: None,
            provider: Some("LOCAL".to_string()),
            exp: None,
            cookie_expiration: None,
            onboarding_completed: false,
        }
    }

    #[test]
    fn test_initial_state() {
        let store = SessionStore::new();
        let state = store.snapshot();
        assert!(state.user.is_none());
        assert!(!state.is_loading);
        assert!(state.last_error.is_none());
        assert_eq!(store.route(), Route::SignIn);
    }

    #[test]
    fn test_loading_guard_nests() {
        let store = SessionStore::new();
        let outer = store.begin_loading();
        let inner = store.begin_loading();
        assert!(store.is_loading());
        drop(inner);
        assert!(store.is_loading());
        drop(outer);
        assert!(!store.is_loading());
    }

    #[test]
    fn test_loading_guard_released_on_early_return() {
        fn failing(store: &SessionStore) -> Result<(), ()> {
            let _guard = store.begin_loading();
            Err(())
        }
        let store = SessionStore::new();
        assert!(failing(&store).is_err());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_sign_in_notifies_watchers_and_listeners() {
        let store = SessionStore::new();
        let mut watcher = store.subscribe();
        let mut events = store.events();
        store.set_error(SessionError::Request("old".into()));

        store.sign_in(user("a@b.com"), SignInOrigin::Credentials);

        watcher.changed().await.unwrap();
        let state = watcher.borrow_and_update().clone();
        assert_eq!(state.user.unwrap().email, "a@b.com");
        assert!(state.last_error.is_none());

        match events.recv().await.unwrap() {
            SessionEvent::SignedIn { user, origin } => {
                assert_eq!(user.email, "a@b.com");
                assert_eq!(origin, SignInOrigin::Credentials);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalidate_keeps_reason() {
        let store = SessionStore::new();
        let mut events = store.events();
        store.sign_in(user("a@b.com"), SignInOrigin::Restore);
        store.invalidate(Some(SessionError::Request("revoked".into())));

        assert!(store.user().is_none());
        assert_eq!(store.last_error(), Some(SessionError::Request("revoked".into())));
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::SignedIn { .. }));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Invalidated);
    }

    #[test]
    fn test_mark_onboarding_completed() {
        let store = SessionStore::new();
        assert!(!store.mark_onboarding_completed());

        store.set_user(Some(user("a@b.com")));
        assert_eq!(store.route(), Route::Onboarding);
        assert!(store.mark_onboarding_completed());
        assert!(store.user().unwrap().onboarding_completed);
        assert_eq!(store.route(), Route::Home);
    }

    #[test]
    fn test_patch_name() {
        let store = SessionStore::new();
        assert!(!store.patch_name("Nobody"));
        store.set_user(Some(user("a@b.com")));
        assert!(store.patch_name("Grace"));
        assert_eq!(store.user().unwrap().name, "Grace");
    }

    #[test]
    fn test_sign_out_clears_error() {
        let store = SessionStore::new();
        store.set_user(Some(user("a@b.com")));
        store.set_error(SessionError::Request("x".into()));
        store.sign_out();
        assert!(store.user().is_none());
        assert!(store.last_error().is_none());
    }
}
