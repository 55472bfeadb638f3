//! Core types for lendfetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AuthError, Error, FetchError};

/// Identifier of a title on the lending service
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleId(String);

impl TitleId {
    /// Parse a title identifier from either a bare identifier or a full
    /// details-page URL (`https://<service>/details/<id>`).
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidTitle("empty title identifier".to_string()));
        }

        let id = match input.split_once("/details/") {
            Some((_, rest)) => {
                let id = rest
                    .split(['?', '/', '#'])
                    .next()
                    .unwrap_or_default()
                    .to_string();
                if id.is_empty() {
                    return Err(Error::InvalidTitle(format!(
                        "no identifier found in URL: {input}"
                    )));
                }
                id
            }
            None => input.to_string(),
        };

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(Error::InvalidTitle(format!(
                "identifier may only contain letters, digits, dash, underscore, or dot: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authentication credentials for the lending service
///
/// Owned by the caller and never persisted by the library.
#[derive(Clone)]
pub struct Credentials {
    /// Account identifier (email address)
    pub email: String,
    password: String,
}

impl Credentials {
    /// Create credentials, rejecting empty fields up front.
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let email = email.into();
        let password = password.into();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Self { email, password })
    }

    /// The account secret
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A live network identity established from [`Credentials`]
///
/// Threaded explicitly through every call that needs it; there is no ambient
/// session state. Transport details (cookies) live inside the service client.
#[derive(Clone, Debug)]
pub struct Session {
    /// Account the session was established for
    pub account: String,
    /// When the session was established
    pub established_at: DateTime<Utc>,
    live: bool,
}

impl Session {
    /// Create a live session for an account.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            established_at: Utc::now(),
            live: true,
        }
    }

    /// Whether the session is still valid for service calls
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub(crate) fn invalidate(&mut self) {
        self.live = false;
    }
}

/// An active borrow of a title
///
/// The loan token authorizes page fetches and the eventual return. A loan is
/// terminal once released; the [`LoanManager`](crate::loan::LoanManager)
/// enforces that it is never reused.
#[derive(Clone, Debug)]
pub struct Loan {
    /// The borrowed title
    pub title: TitleId,
    /// Opaque loan token issued by the service
    pub token: String,
    /// When the loan was granted
    pub acquired_at: DateTime<Utc>,
}

impl Loan {
    /// Create a loan acquired now.
    pub fn new(title: TitleId, token: impl Into<String>) -> Self {
        Self {
            title,
            token: token.into(),
            acquired_at: Utc::now(),
        }
    }
}

/// Service-reported description of a borrowed title's pages
#[derive(Clone, Debug)]
pub struct Manifest {
    /// Display title
    pub title: String,
    /// Page count reported by the service
    pub page_count: usize,
    /// Page image locators in reading order
    pub locators: Vec<String>,
    /// Opaque title metadata, preserved for the artifact step
    pub metadata: serde_json::Value,
}

/// A single page to fetch
///
/// Immutable once enumerated. Indices are dense from 0 to page count - 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Zero-based page index
    pub index: usize,
    /// Locator the page image is fetched from
    pub locator: String,
    /// Expected payload size in bytes, when the service reports one
    pub size_hint: Option<u64>,
}

/// Outcome of fetching one page
#[derive(Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page was fetched; payload bytes attached
    Fetched(Vec<u8>),
    /// The page failed with the final error after any retries
    Failed(FetchError),
}

impl std::fmt::Debug for PageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageOutcome::Fetched(bytes) => write!(f, "Fetched({} bytes)", bytes.len()),
            PageOutcome::Failed(err) => write!(f, "Failed({err})"),
        }
    }
}

/// The recorded result for one page, produced exactly once per descriptor
#[derive(Clone, Debug)]
pub struct PageResult {
    /// The page index this result belongs to
    pub index: usize,
    /// What happened
    pub outcome: PageOutcome,
}

impl PageResult {
    /// Whether the page was fetched successfully
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, PageOutcome::Fetched(_))
    }

    /// The payload bytes, if the page was fetched
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.outcome {
            PageOutcome::Fetched(bytes) => Some(bytes),
            PageOutcome::Failed(_) => None,
        }
    }
}

/// The indexed outcome set for all pages of one loan's fetch pass
///
/// Every index in `0..len()` appears exactly once, regardless of completion
/// order or failures; consumers read it in ascending index order.
#[derive(Debug)]
pub struct FetchReport {
    results: Vec<PageResult>,
}

impl FetchReport {
    /// Build a report from the fetcher's slot table.
    ///
    /// Panics in debug builds if a slot was left unfilled; the fetcher writes
    /// every slot exactly once by construction.
    pub(crate) fn from_slots(slots: Vec<Option<PageResult>>) -> Self {
        let results: Vec<PageResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                debug_assert!(slot.is_some(), "page {index} has no recorded result");
                slot.unwrap_or(PageResult {
                    index,
                    outcome: PageOutcome::Failed(FetchError::Cancelled),
                })
            })
            .collect();
        Self { results }
    }

    /// Number of pages covered by the report
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the report covers no pages
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True iff every page has a successful result
    pub fn complete(&self) -> bool {
        self.results.iter().all(PageResult::is_ok)
    }

    /// Number of successfully fetched pages
    pub fn fetched_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// Indices with no successful fetch, ascending
    pub fn missing_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.index)
            .collect()
    }

    /// The result for a page index
    pub fn get(&self, index: usize) -> Option<&PageResult> {
        self.results.get(index)
    }

    /// Iterate results in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = &PageResult> {
        self.results.iter()
    }

    /// Iterate `(index, payload)` for successful pages in ascending index order
    pub fn ok_pages(&self) -> impl Iterator<Item = (usize, &[u8])> {
        self.results
            .iter()
            .filter_map(|r| r.payload().map(|bytes| (r.index, bytes)))
    }
}

/// The final output of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    /// One composite document embedding all pages in index order
    Document {
        /// Path of the written document
        path: PathBuf,
    },
    /// A directory of page files named by zero-padded index
    Pages {
        /// Directory the pages were written to
        dir: PathBuf,
        /// The written page files, ascending by index
        files: Vec<PathBuf>,
    },
}

impl Artifact {
    /// The artifact's filesystem location (document path or page directory)
    pub fn path(&self) -> &std::path::Path {
        match self {
            Artifact::Document { path } => path,
            Artifact::Pages { dir, .. } => dir,
        }
    }
}

/// An assembled artifact plus the pages it could not include
#[derive(Clone, Debug)]
pub struct Assembly {
    /// The written artifact
    pub artifact: Artifact,
    /// Page indices absent from the artifact (empty in strict mode)
    pub missing_pages: Vec<usize>,
}

/// Successful result of [`Orchestrator::run`](crate::orchestrator::Orchestrator::run)
#[derive(Debug)]
pub struct RunOutcome {
    /// The written artifact
    pub artifact: Artifact,
    /// Page indices absent from the artifact (non-empty only in partial mode)
    pub missing_pages: Vec<usize>,
    /// Per-page fetch detail
    pub report: FetchReport,
}

/// Event emitted during the download lifecycle
///
/// Events are discrete structured values, not formatted text; subscribers
/// control presentation. Emission is best-effort and never affects the run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A login attempt is starting
    LoggingIn {
        /// Account being authenticated
        account: String,
    },

    /// A loan was granted
    LoanAcquired {
        /// The borrowed title
        title: String,
    },

    /// The service refused to grant a loan
    LoanDenied {
        /// The requested title
        title: String,
        /// The refusal reason
        reason: String,
    },

    /// The page list was enumerated
    PagesEnumerated {
        /// The borrowed title
        title: String,
        /// Number of pages to fetch
        count: usize,
    },

    /// A page was fetched successfully
    PageFetched {
        /// The page index
        index: usize,
        /// Payload size in bytes
        size_bytes: u64,
    },

    /// A page failed after any retries
    PageFailed {
        /// The page index
        index: usize,
        /// The final failure reason
        reason: String,
    },

    /// Fetch progress update
    FetchProgress {
        /// Pages with a recorded outcome so far
        completed: usize,
        /// Total pages in this fetch pass
        total: usize,
    },

    /// The loan return was attempted
    LoanReleased {
        /// The returned title
        title: String,
        /// Whether the service acknowledged the return
        ok: bool,
    },

    /// The artifact was written
    ArtifactReady {
        /// Filesystem location of the artifact
        path: PathBuf,
    },

    /// The run failed
    RunFailed {
        /// The requested title
        title: String,
        /// The originating error
        error: String,
        /// Page indices with no successful fetch, when known
        missing_pages: Vec<usize>,
    },
}
