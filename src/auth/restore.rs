//! Startup session restoration.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::transport::{RestoreOutcome, SessionTransport};
use crate::session::{SessionStore, SignInOrigin};

/// Rebuilds the session once per process.
///
/// Concurrent or repeated calls share the first run's outcome.
pub struct SessionRestorer {
    transport: Arc<dyn SessionTransport>,
    session: SessionStore,
    outcome: OnceCell<RestoreOutcome>,
}

impl SessionRestorer {
    pub fn new(transport: Arc<dyn SessionTransport>, session: SessionStore) -> Self {
        Self {
            transport,
            session,
            outcome: OnceCell::new(),
        }
    }

    /// Restore the session, or return the outcome of the run that already did.
    pub async fn restore(&self) -> RestoreOutcome {
        self.outcome.get_or_init(|| self.run()).await.clone()
    }

    pub fn has_run(&self) -> bool {
        self.outcome.initialized()
    }

    async fn run(&self) -> RestoreOutcome {
        let _loading = self.session.begin_loading();
        let outcome = self.transport.restore().await;

        match &outcome {
            RestoreOutcome::Restored(user) => {
                self.session.sign_in(user.clone(), SignInOrigin::Restore);
            }
            RestoreOutcome::TransientFailure(user) => {
                info!(offline_user = user.is_some(), "Restored without backend confirmation");
                self.session.set_user(user.clone());
            }
            RestoreOutcome::NeedsLogin => self.session.set_user(None),
        }
        outcome
    }
}

impl std::fmt::Debug for SessionRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRestorer")
            .field("platform", &self.transport.platform())
            .field("outcome", &self.outcome.get())
            .finish()
    }
}
