//! Concurrent page fetching
//!
//! Drives every page of a loan through a bounded worker pool and produces a
//! [`FetchReport`] covering each index exactly once. Workers pull pages from
//! a shared queue (`buffer_unordered`), so a slow page never starves an idle
//! worker. Per-page transient failures are retried with backoff and then
//! recorded; they never abort the batch. Cancellation stops new work,
//! abandons in-flight fetches, and still yields a report so the loan can be
//! released cleanly.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{FetchConfig, RetryConfig};
use crate::error::FetchError;
use crate::pages::PageSource;
use crate::retry::fetch_with_retry;
use crate::types::{Event, FetchReport, Loan, PageDescriptor, PageOutcome, PageResult, Session};

/// Executes page fetches in parallel under a bounded worker budget.
pub struct ConcurrentFetcher {
    workers: usize,
    page_timeout: Duration,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
}

impl ConcurrentFetcher {
    /// Create a fetcher from the fetch and retry configuration.
    pub fn new(
        fetch: &FetchConfig,
        retry: RetryConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            workers: fetch.workers.max(1),
            page_timeout: fetch.page_timeout,
            retry,
            event_tx,
        }
    }

    /// Fetch every page and produce the report.
    ///
    /// Completion order is unspecified; the report is keyed by index, so
    /// downstream consumption is ordered independently of it. Every
    /// descriptor appears in the report exactly once, whatever happened.
    pub async fn drive(
        &self,
        source: &PageSource,
        session: &Session,
        loan: &Loan,
        pages: Vec<PageDescriptor>,
        cancel: &CancellationToken,
    ) -> FetchReport {
        let total = pages.len();
        let mut slots: Vec<Option<PageResult>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;

        tracing::info!(
            title = %loan.title,
            pages = total,
            workers = self.workers,
            "Fetching pages"
        );

        let mut results = stream::iter(pages)
            .map(|descriptor| self.fetch_page(source, session, loan, descriptor, cancel))
            .buffer_unordered(self.workers);

        while let Some(result) = results.next().await {
            completed += 1;
            match &result.outcome {
                PageOutcome::Fetched(bytes) => {
                    tracing::debug!(page = result.index, bytes = bytes.len(), "Page fetched");
                    self.event_tx
                        .send(Event::PageFetched {
                            index: result.index,
                            size_bytes: bytes.len() as u64,
                        })
                        .ok();
                }
                PageOutcome::Failed(e) => {
                    tracing::warn!(page = result.index, error = %e, "Page failed");
                    self.event_tx
                        .send(Event::PageFailed {
                            index: result.index,
                            reason: e.to_string(),
                        })
                        .ok();
                }
            }
            self.event_tx
                .send(Event::FetchProgress { completed, total })
                .ok();

            // Each index is produced exactly once, so each slot is written once.
            let index = result.index;
            if let Some(slot) = slots.get_mut(index) {
                debug_assert!(slot.is_none(), "page {index} completed twice");
                *slot = Some(result);
            }
        }

        let report = FetchReport::from_slots(slots);
        tracing::info!(
            title = %loan.title,
            fetched = report.fetched_count(),
            total = report.len(),
            complete = report.complete(),
            "Fetch pass finished"
        );
        report
    }

    /// Fetch one page with per-attempt timeout, retry, and cancellation.
    async fn fetch_page(
        &self,
        source: &PageSource,
        session: &Session,
        loan: &Loan,
        descriptor: PageDescriptor,
        cancel: &CancellationToken,
    ) -> PageResult {
        let index = descriptor.index;

        // Dequeued after cancellation: record without touching the network.
        if cancel.is_cancelled() {
            return PageResult {
                index,
                outcome: PageOutcome::Failed(FetchError::Cancelled),
            };
        }

        let attempts = fetch_with_retry(&self.retry, || async {
            match tokio::time::timeout(
                self.page_timeout,
                source.fetch_one(session, loan, &descriptor),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Transient(format!(
                    "page {index} timed out after {:?}",
                    self.page_timeout
                ))),
            }
        });

        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            result = attempts => result,
        };

        PageResult {
            index,
            outcome: match outcome {
                Ok(bytes) => PageOutcome::Fetched(bytes),
                Err(e) => PageOutcome::Failed(e),
            },
        }
    }
}
