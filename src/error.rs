//! Error types for lendfetch
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (Auth, Loan, Metadata, Fetch, Assembly)
//! - A top-level [`Error`] that all domain errors fold into
//! - [`RunError`], which attaches the per-page fetch detail to a failed run

use thiserror::Error;

use crate::types::FetchReport;

/// Result type alias for lendfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for lendfetch
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.workers")
        key: Option<String>,
    },

    /// Authentication failed
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Borrowing the title failed
    #[error("loan error: {0}")]
    Loan(#[from] LoanError),

    /// Page enumeration failed
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Page fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Artifact assembly failed
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The supplied title identifier or URL could not be parsed
    #[error("invalid title identifier: {0}")]
    InvalidTitle(String),

    /// Operation cancelled before it could start
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Authentication errors
///
/// Reported immediately to the caller; the library never retries a login.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The service rejected the supplied credentials
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The service reported the account as locked
    #[error("account locked by the service: {reason}")]
    Lockout {
        /// The lockout reason reported by the service
        reason: String,
    },

    /// The login request could not be completed
    #[error("network failure during login: {reason}")]
    Network {
        /// Description of the underlying transport failure
        reason: String,
    },
}

/// Loan errors
///
/// Fatal for the current attempt; the caller may retry the whole operation later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoanError {
    /// The title cannot be borrowed (no copies, restricted, or refused)
    #[error("title {title} is not available to borrow: {reason}")]
    Unavailable {
        /// The title identifier
        title: String,
        /// The refusal reason reported by the service
        reason: String,
    },

    /// The service is rate-limiting loan requests
    #[error("loan request for {title} was rate-limited")]
    RateLimited {
        /// The title identifier
        title: String,
    },

    /// The loan request could not be completed
    #[error("network failure while borrowing {title}: {reason}")]
    Network {
        /// The title identifier
        title: String,
        /// Description of the underlying transport failure
        reason: String,
    },
}

/// Metadata errors raised during page enumeration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// The service-reported page count disagrees with the enumerated locators
    #[error("page count mismatch for {title}: service reported {reported}, enumerated {enumerated}")]
    PageCountMismatch {
        /// The title identifier
        title: String,
        /// The page count reported by the service
        reported: usize,
        /// The number of page locators actually enumerated
        enumerated: usize,
    },

    /// The title manifest could not be parsed
    #[error("malformed title manifest: {0}")]
    Malformed(String),

    /// The manifest request could not be completed
    #[error("network failure while enumerating pages: {0}")]
    Network(String),
}

/// Per-page fetch errors
///
/// Only [`FetchError::Transient`] is retried; every other variant is recorded
/// in the fetch report without further attempts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// A failure expected to succeed on retry (timeout, 5xx, connection reset)
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// A failure that will not succeed on retry (not found, access denied)
    #[error("permanent fetch failure: {0}")]
    Permanent(String),

    /// The loan expired while the page was being fetched
    #[error("loan expired while fetching")]
    LoanExpired,

    /// The fetch was abandoned because the run was cancelled
    #[error("fetch cancelled")]
    Cancelled,
}

/// Assembly errors
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Strict assembly was requested but pages are missing
    #[error("fetch report is incomplete: missing pages {missing:?}")]
    Incomplete {
        /// The page indices with no successful fetch, ascending
        missing: Vec<usize>,
    },

    /// A page payload could not be embedded in the composite document
    #[error("page {index} has an unsupported payload: {reason}")]
    UnsupportedPayload {
        /// The page index whose payload was rejected
        index: usize,
        /// Why the payload could not be embedded
        reason: String,
    },

    /// Writing the artifact failed
    #[error("I/O error during assembly: {0}")]
    Io(#[from] std::io::Error),
}

/// A failed run, carrying the fetch report (when one was produced) so callers
/// can inspect per-page outcomes and retry manually.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    /// The originating error
    pub error: Error,
    /// Per-page detail, present once the fetch phase has run
    pub report: Option<FetchReport>,
}

impl From<Error> for RunError {
    fn from(error: Error) -> Self {
        Self {
            error,
            report: None,
        }
    }
}

impl RunError {
    /// Attach a fetch report to an error for diagnostics.
    pub fn with_report(error: Error, report: FetchReport) -> Self {
        Self {
            error,
            report: Some(report),
        }
    }
}
