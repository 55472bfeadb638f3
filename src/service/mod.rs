//! Lending service abstraction
//!
//! [`LendingService`] is the single network seam of the library: login/logout,
//! loan acquisition and release, page enumeration, and per-page fetching.
//! The production implementation ([`HttpLendingService`]) speaks the real
//! service protocol; tests install scripted implementations.

mod http;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpLendingService;

use crate::error::{AuthError, FetchError, LoanError, MetadataError};
use crate::types::{Credentials, Loan, Manifest, PageDescriptor, Session, TitleId};

/// Abstraction over the lending service, enabling testability.
///
/// All session and loan state is passed explicitly; implementations must not
/// keep ambient per-title state beyond transport details (cookies).
#[async_trait::async_trait]
pub trait LendingService: Send + Sync {
    /// Establish a session from credentials. Never retried by the library.
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// Invalidate a session on the service side. Best-effort; callers swallow failures.
    async fn logout(&self, session: &Session) -> Result<(), AuthError>;

    /// Borrow a title, returning the loan whose token authorizes page fetches.
    async fn acquire_loan(&self, session: &Session, title: &TitleId) -> Result<Loan, LoanError>;

    /// Return a borrowed title. Best-effort; callers swallow failures.
    async fn release_loan(&self, session: &Session, loan: &Loan) -> Result<(), LoanError>;

    /// Fetch the manifest describing a borrowed title's pages.
    async fn page_manifest(
        &self,
        session: &Session,
        loan: &Loan,
    ) -> Result<Manifest, MetadataError>;

    /// Fetch one page image under a loan.
    async fn fetch_page(
        &self,
        session: &Session,
        loan: &Loan,
        descriptor: &PageDescriptor,
    ) -> Result<Vec<u8>, FetchError>;
}
