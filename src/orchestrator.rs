//! Run orchestration — top-level lifecycle for a single title download.
//!
//! Phases:
//! 1. Login
//! 2. Borrow the title (a refusal propagates; nothing to release)
//! 3. Enumerate pages and fetch them concurrently
//! 4. Release the loan — attempted exactly once after the fetch phase,
//!    whatever its outcome, and never while fetches are still in flight
//! 5. Assemble the artifact
//! 6. Best-effort logout, independent of the run's outcome

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::assemble::Assembler;
use crate::config::Config;
use crate::error::{Error, Result, RunError};
use crate::fetcher::ConcurrentFetcher;
use crate::loan::LoanManager;
use crate::pages::PageSource;
use crate::service::{HttpLendingService, LendingService};
use crate::session::Authenticator;
use crate::types::{Credentials, Event, FetchReport, Loan, Manifest, RunOutcome, Session, TitleId};

/// Buffer size of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Composes login, loan, fetch, and assembly into one scoped run.
pub struct Orchestrator {
    service: Arc<dyn LendingService>,
    config: Config,
    event_tx: broadcast::Sender<Event>,
}

impl Orchestrator {
    /// Create an orchestrator talking to the configured HTTP service.
    pub fn new(config: Config) -> Result<Self> {
        let service = Arc::new(HttpLendingService::new(&config.service)?);
        Self::with_service(config, service)
    }

    /// Create an orchestrator over a custom service implementation.
    pub fn with_service(config: Config, service: Arc<dyn LendingService>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            service,
            config,
            event_tx,
        })
    }

    /// Subscribe to lifecycle events.
    ///
    /// Subscribers are optional and may lag; the run never waits on them.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Download one title: borrow, fetch all pages, assemble, release.
    ///
    /// The loan, if acquired, is released on every exit path: success,
    /// partial fetch failure, assembly failure, and cancellation. On failure
    /// the [`RunError`] carries the fetch report when one was produced.
    pub async fn run(
        &self,
        credentials: &Credentials,
        title: &TitleId,
        cancel: &CancellationToken,
    ) -> std::result::Result<RunOutcome, RunError> {
        let result = self.run_inner(credentials, title, cancel).await;

        if let Err(run_error) = &result {
            tracing::error!(title = %title, error = %run_error.error, "Run failed");
            self.event_tx
                .send(Event::RunFailed {
                    title: title.to_string(),
                    error: run_error.error.to_string(),
                    missing_pages: run_error
                        .report
                        .as_ref()
                        .map(FetchReport::missing_indices)
                        .unwrap_or_default(),
                })
                .ok();
        }
        result
    }

    async fn run_inner(
        &self,
        credentials: &Credentials,
        title: &TitleId,
        cancel: &CancellationToken,
    ) -> std::result::Result<RunOutcome, RunError> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled.into());
        }

        self.event_tx
            .send(Event::LoggingIn {
                account: credentials.email.clone(),
            })
            .ok();
        let authenticator = Authenticator::new(Arc::clone(&self.service));
        let mut session = authenticator
            .login(credentials)
            .await
            .map_err(Error::from)?;

        let result = self.run_with_session(&session, title, cancel).await;

        // Final cleanup, independent of how the run went.
        authenticator.logout(&mut session).await;
        result
    }

    async fn run_with_session(
        &self,
        session: &Session,
        title: &TitleId,
        cancel: &CancellationToken,
    ) -> std::result::Result<RunOutcome, RunError> {
        let loans = LoanManager::new(Arc::clone(&self.service), self.event_tx.clone());

        // A refused borrow propagates as-is; there is nothing to release.
        let loan = loans.borrow(session, title).await.map_err(Error::from)?;

        // The fetch phase is bracketed by the loan: release is attempted
        // exactly once after it returns, on success, failure, and
        // cancellation alike. The parallel region has fully drained by
        // then, so no fetch can outlive the loan.
        let fetch_result = self.fetch_phase(session, &loan, cancel).await;
        loans.release(session, &loan).await;
        let (manifest, report) = fetch_result?;

        // Assembly does image decoding and disk writes; keep it off the
        // async workers.
        let assembler = Assembler::new(&self.config.output);
        let (assembly_result, report) = tokio::task::spawn_blocking(move || {
            let result = assembler.assemble(&manifest, &report);
            (result, report)
        })
        .await
        .map_err(|e| RunError::from(Error::Other(format!("assembly task failed: {e}"))))?;

        match assembly_result {
            Ok(assembly) => {
                self.event_tx
                    .send(Event::ArtifactReady {
                        path: assembly.artifact.path().to_path_buf(),
                    })
                    .ok();
                Ok(RunOutcome {
                    artifact: assembly.artifact,
                    missing_pages: assembly.missing_pages,
                    report,
                })
            }
            Err(error) => Err(RunError::with_report(error, report)),
        }
    }

    /// Enumerate and fetch every page under the loan.
    async fn fetch_phase(
        &self,
        session: &Session,
        loan: &Loan,
        cancel: &CancellationToken,
    ) -> Result<(Manifest, FetchReport)> {
        let source = PageSource::new(Arc::clone(&self.service), self.config.fetch.quality);
        let enumeration = source.enumerate(session, loan).await?;
        self.event_tx
            .send(Event::PagesEnumerated {
                title: loan.title.to_string(),
                count: enumeration.pages.len(),
            })
            .ok();

        let fetcher = ConcurrentFetcher::new(
            &self.config.fetch,
            self.config.retry.clone(),
            self.event_tx.clone(),
        );
        let report = fetcher
            .drive(&source, session, loan, enumeration.pages, cancel)
            .await;
        Ok((enumeration.manifest, report))
    }
}
