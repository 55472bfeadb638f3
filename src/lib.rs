//! # lendfetch
//!
//! Backend library for downloading digitized books from a lending service.
//!
//! ## Design Philosophy
//!
//! lendfetch is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Loan-safe** - A borrowed title is always returned, on every exit path
//! - **Event-driven** - Consumers subscribe to structured events, no polling required
//! - **Sensible defaults** - Works out of the box with zero configuration
//!
//! A run borrows a title, fetches every page image concurrently under the
//! loan, assembles the pages into a composite PDF (or a directory of page
//! files), and releases the loan regardless of how the retrieval went.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lendfetch::{Config, Credentials, Orchestrator, TitleId};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::new("reader@example.com", "secret")?;
//!     let title = TitleId::parse("https://archive.org/details/some-book")?;
//!
//!     let orchestrator = Orchestrator::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let cancel = CancellationToken::new();
//!     lendfetch::cancel_on_ctrl_c(cancel.clone());
//!
//!     let outcome = orchestrator.run(&credentials, &title, &cancel).await?;
//!     println!("Saved to {}", outcome.artifact.path().display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact assembly
pub mod assemble;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Concurrent page fetching
pub mod fetcher;
/// Loan lifecycle management
pub mod loan;
/// Run orchestration
pub mod orchestrator;
/// Page enumeration and fetching
pub mod pages;
/// Retry logic with exponential backoff
pub mod retry;
/// Lending service abstraction and HTTP implementation
pub mod service;
/// Session establishment and teardown
pub mod session;
/// Core types and events
pub mod types;
/// Path and filename helpers
pub mod util;

// Re-export commonly used types
pub use config::{
    AssemblyMode, Config, FetchConfig, OutputConfig, OutputMode, RetryConfig, ServiceConfig,
};
pub use error::{
    AssemblyError, AuthError, Error, FetchError, LoanError, MetadataError, Result, RunError,
};
pub use fetcher::ConcurrentFetcher;
pub use loan::{LoanManager, LoanState};
pub use orchestrator::Orchestrator;
pub use pages::PageSource;
pub use service::{HttpLendingService, LendingService};
pub use session::Authenticator;
pub use types::{
    Artifact, Credentials, Event, FetchReport, Loan, Manifest, PageDescriptor, PageOutcome,
    PageResult, RunOutcome, Session, TitleId,
};

/// Cancel a token when the process receives a termination signal.
///
/// Spawns a background task that waits for SIGTERM/SIGINT (Ctrl+C on
/// non-Unix platforms) and cancels the token, letting an in-flight
/// [`Orchestrator::run`] wind down cleanly: no new page fetches, loan
/// released, report produced.
pub fn cancel_on_ctrl_c(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Termination signal received, cancelling run");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        _ => {
            tracing::warn!("Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
