//! Where the UI should be, given the session.

use super::SessionState;

/// Top-level destination derived from session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Restore or sign-in still in flight; render nothing yet.
    Loading,
    SignIn,
    Onboarding,
    Home,
}

impl Route {
    pub fn for_state(state: &SessionState) -> Self {
        if state.is_loading {
            return Route::Loading;
        }
        match &state.user {
            None => Route::SignIn,
            Some(user) if !user.onboarding_completed => Route::Onboarding,
            Some(_) => Route::Home,
        }
    }

    /// Navigation path for this route.
    pub fn path(self) -> &'static str {
        match self {
            Route::Loading => "/",
            Route::SignIn => "/sign-in",
            Route::Onboarding => "/onboarding",
            Route::Home => "/home",
        }
    }
}

/// Navigation side effects requested by the session core.
pub trait Navigator: Send + Sync {
    /// Replace the current screen with `route`.
    fn replace(&self, route: Route);
}

/// Navigator for headless use; does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn replace(&self, _route: Route) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::AuthenticatedUser;

    #[test]
    fn test_loading_wins() {
        let state = SessionState {
            is_loading: true,
            ..Default::default()
        };
        assert_eq!(Route::for_state(&state), Route::Loading);
    }

    #[test]
    fn test_onboarding_then_home() {
        let mut user = AuthenticatedUser {
            email: "a@b.com".into(),
            name: String::new(),
            picture: None,
            provider: None,
            exp: None,
            cookie_expiration: None,
            onboarding_completed: false,
        };
        let state = SessionState {
            user: Some(user.clone()),
            ..Default::default()
        };
        assert_eq!(Route::for_state(&state), Route::Onboarding);

        user.onboarding_completed = true;
        let state = SessionState {
            user: Some(user),
            ..Default::default()
        };
        assert_eq!(Route::for_state(&state), Route::Home);
        assert_eq!(Route::SignIn.path(), "/sign-in");
    }
}
