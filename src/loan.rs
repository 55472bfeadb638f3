//! Loan lifecycle management
//!
//! One [`LoanManager`] governs one title's loan through the state machine
//! `Idle → Borrowing → Borrowed → Returning → Released`, with a terminal
//! `BorrowFailed` edge when the service refuses the loan. Release is
//! best-effort: attempted exactly once per successful borrow, idempotent
//! afterwards, and its outcome never changes the run's primary result.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::LoanError;
use crate::service::LendingService;
use crate::types::{Event, Loan, Session, TitleId};

/// States of a title's loan lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoanState {
    /// No loan activity yet
    Idle,
    /// Borrow request in flight
    Borrowing,
    /// Loan is held; page fetches are authorized
    Borrowed,
    /// Return request in flight
    Returning,
    /// Loan returned (terminal)
    Released,
    /// The service refused the loan (terminal)
    BorrowFailed,
}

/// Acquires and releases a time-bounded loan on a single title.
pub struct LoanManager {
    service: Arc<dyn LendingService>,
    event_tx: broadcast::Sender<Event>,
    state: tokio::sync::Mutex<LoanState>,
}

impl LoanManager {
    /// Create a loan manager in the `Idle` state.
    pub fn new(service: Arc<dyn LendingService>, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            service,
            event_tx,
            state: tokio::sync::Mutex::new(LoanState::Idle),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LoanState {
        *self.state.lock().await
    }

    /// Borrow a title.
    ///
    /// On success the returned [`Loan`]'s token authorizes every subsequent
    /// page fetch for the title. On refusal the manager is terminally
    /// `BorrowFailed` and the error propagates to the caller.
    pub async fn borrow(&self, session: &Session, title: &TitleId) -> Result<Loan, LoanError> {
        {
            let mut state = self.state.lock().await;
            if *state != LoanState::Idle {
                return Err(LoanError::Unavailable {
                    title: title.to_string(),
                    reason: format!("loan manager is not idle (state {state:?})"),
                });
            }
            *state = LoanState::Borrowing;
        }

        tracing::info!(title = %title, "Borrowing title");
        match self.service.acquire_loan(session, title).await {
            Ok(loan) => {
                *self.state.lock().await = LoanState::Borrowed;
                self.event_tx
                    .send(Event::LoanAcquired {
                        title: title.to_string(),
                    })
                    .ok();
                Ok(loan)
            }
            Err(e) => {
                *self.state.lock().await = LoanState::BorrowFailed;
                tracing::warn!(title = %title, error = %e, "Borrow refused");
                self.event_tx
                    .send(Event::LoanDenied {
                        title: title.to_string(),
                        reason: e.to_string(),
                    })
                    .ok();
                Err(e)
            }
        }
    }

    /// Return a borrowed title.
    ///
    /// Safe to call on any state: only a held loan triggers a service call,
    /// so re-releasing an already-released loan is a no-op. A failed return
    /// is logged as a warning and swallowed; failing to return a loan must
    /// not mask the result of the download itself.
    pub async fn release(&self, session: &Session, loan: &Loan) {
        {
            let mut state = self.state.lock().await;
            match *state {
                LoanState::Borrowed => *state = LoanState::Returning,
                LoanState::Returning | LoanState::Released => {
                    tracing::debug!(title = %loan.title, "Loan already released");
                    return;
                }
                other => {
                    tracing::debug!(title = %loan.title, state = ?other, "No held loan to release");
                    return;
                }
            }
        }

        let ok = match self.service.release_loan(session, loan).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(title = %loan.title, error = %e, "Failed to return loan");
                false
            }
        };

        *self.state.lock().await = LoanState::Released;
        self.event_tx
            .send(Event::LoanReleased {
                title: loan.title.to_string(),
                ok,
            })
            .ok();
    }
}
