//! Scripted in-memory lending service for lifecycle tests.
//!
//! Counts every call so tests can assert invariants like "exactly one release
//! per borrow", and lets individual pages be scripted to fail, flap, or hang.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{AuthError, FetchError, LoanError, MetadataError};
use crate::types::{Credentials, Loan, Manifest, PageDescriptor, Session, TitleId};

use super::LendingService;

/// Scripted behavior for one page index.
pub(crate) enum PageBehavior {
    /// Fail permanently on every attempt
    Permanent,
    /// Fail transiently `n` times, then succeed
    TransientTimes(u32),
    /// Fail transiently on every attempt
    AlwaysTransient,
    /// Succeed after a fixed delay (for completion-order tests)
    Delay(Duration),
    /// Block for a long time (cancellation tests abandon these fetches)
    Hang,
}

/// In-memory [`LendingService`] with scripted outcomes and call counters.
pub(crate) struct MockLendingService {
    pages: Vec<Vec<u8>>,
    reported_count: Option<usize>,
    borrow_error: Option<LoanError>,
    release_error: Option<LoanError>,
    behaviors: Mutex<HashMap<usize, PageBehavior>>,

    pub(crate) login_calls: AtomicUsize,
    pub(crate) logout_calls: AtomicUsize,
    pub(crate) borrow_calls: AtomicUsize,
    pub(crate) release_calls: AtomicUsize,
    pub(crate) fetch_calls: Mutex<HashMap<usize, usize>>,
}

impl MockLendingService {
    /// A service holding `page_count` pages with distinct payloads.
    pub(crate) fn with_pages(page_count: usize) -> Self {
        let pages = (0..page_count)
            .map(|i| format!("payload-for-page-{i}").into_bytes())
            .collect();
        Self {
            pages,
            reported_count: None,
            borrow_error: None,
            release_error: None,
            behaviors: Mutex::new(HashMap::new()),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            borrow_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            fetch_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Script a page to misbehave.
    pub(crate) fn with_behavior(self, index: usize, behavior: PageBehavior) -> Self {
        if let Ok(mut behaviors) = self.behaviors.lock() {
            behaviors.insert(index, behavior);
        }
        self
    }

    /// Make every borrow attempt fail.
    pub(crate) fn with_borrow_error(mut self, error: LoanError) -> Self {
        self.borrow_error = Some(error);
        self
    }

    /// Make every release attempt fail (e.g. service unreachable).
    pub(crate) fn with_release_error(mut self, error: LoanError) -> Self {
        self.release_error = Some(error);
        self
    }

    /// Report a page count that disagrees with the enumerated locators.
    pub(crate) fn with_reported_count(mut self, count: usize) -> Self {
        self.reported_count = Some(count);
        self
    }

    /// Total fetch attempts recorded for a page.
    pub(crate) fn fetch_attempts(&self, index: usize) -> usize {
        self.fetch_calls
            .lock()
            .map(|calls| calls.get(&index).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Payload a page should resolve to.
    pub(crate) fn payload(&self, index: usize) -> Vec<u8> {
        self.pages.get(index).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LendingService for MockLendingService {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Session::new(credentials.email.clone()))
    }

    async fn logout(&self, _session: &Session) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn acquire_loan(&self, _session: &Session, title: &TitleId) -> Result<Loan, LoanError> {
        self.borrow_calls.fetch_add(1, Ordering::SeqCst);
        match &self.borrow_error {
            Some(error) => Err(error.clone()),
            None => Ok(Loan::new(title.clone(), "mock-loan-token")),
        }
    }

    async fn release_loan(&self, _session: &Session, _loan: &Loan) -> Result<(), LoanError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        match &self.release_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn page_manifest(
        &self,
        _session: &Session,
        loan: &Loan,
    ) -> Result<Manifest, MetadataError> {
        Ok(Manifest {
            title: format!("Mock Book {}", loan.title),
            page_count: self.reported_count.unwrap_or(self.pages.len()),
            locators: (0..self.pages.len())
                .map(|i| format!("mock://{}/page/{i}", loan.title))
                .collect(),
            metadata: serde_json::json!({ "title": "Mock Book" }),
        })
    }

    async fn fetch_page(
        &self,
        _session: &Session,
        _loan: &Loan,
        descriptor: &PageDescriptor,
    ) -> Result<Vec<u8>, FetchError> {
        let index = descriptor.index;
        if let Ok(mut calls) = self.fetch_calls.lock() {
            *calls.entry(index).or_insert(0) += 1;
        }

        let scripted = {
            let mut behaviors = self.behaviors.lock().unwrap();
            match behaviors.get_mut(&index) {
                Some(PageBehavior::Permanent) => {
                    Some(Err(FetchError::Permanent("access denied".to_string())))
                }
                Some(PageBehavior::AlwaysTransient) => {
                    Some(Err(FetchError::Transient("connection reset".to_string())))
                }
                Some(PageBehavior::TransientTimes(remaining)) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        Some(Err(FetchError::Transient("timeout".to_string())))
                    } else {
                        None
                    }
                }
                Some(PageBehavior::Delay(delay)) => Some(Ok(*delay)),
                Some(PageBehavior::Hang) => Some(Ok(Duration::from_secs(60))),
                None => None,
            }
        };

        match scripted {
            Some(Err(error)) => return Err(error),
            Some(Ok(delay)) => {
                tokio::time::sleep(delay).await;
            }
            None => {}
        }

        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| FetchError::Permanent(format!("no such page {index}")))
    }
}
