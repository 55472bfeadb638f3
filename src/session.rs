//! Session establishment and teardown

use std::sync::Arc;

use crate::error::AuthError;
use crate::service::LendingService;
use crate::types::{Credentials, Session};

/// Establishes and tears down authenticated sessions.
///
/// Login failures are reported immediately; the library never retries a
/// login on its own. Logout is best-effort and idempotent.
pub struct Authenticator {
    service: Arc<dyn LendingService>,
}

impl Authenticator {
    /// Create an authenticator over a lending service.
    pub fn new(service: Arc<dyn LendingService>) -> Self {
        Self { service }
    }

    /// Establish a session from credentials.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.service.login(credentials).await
    }

    /// Invalidate a session.
    ///
    /// A second call on the same session is a no-op. Failures are logged and
    /// swallowed; a failed logout must not mask the run's own result.
    pub async fn logout(&self, session: &mut Session) {
        if !session.is_live() {
            tracing::debug!(account = %session.account, "Session already logged out");
            return;
        }
        if let Err(e) = self.service.logout(session).await {
            tracing::warn!(account = %session.account, error = %e, "Logout failed");
        }
        session.invalidate();
    }
}
