//! Page enumeration and single-page fetching

use std::sync::Arc;

use crate::error::{FetchError, MetadataError};
use crate::service::LendingService;
use crate::types::{Loan, Manifest, PageDescriptor, Session};

/// A borrowed title's manifest plus its enumerated page descriptors.
#[derive(Clone, Debug)]
pub struct Enumeration {
    /// The service-reported manifest
    pub manifest: Manifest,
    /// Dense 0-based page descriptors in reading order
    pub pages: Vec<PageDescriptor>,
}

/// Resolves the ordered page list for a borrowed title and fetches pages.
pub struct PageSource {
    service: Arc<dyn LendingService>,
    quality: u8,
}

impl PageSource {
    /// Create a page source with the configured quality selector.
    pub fn new(service: Arc<dyn LendingService>, quality: u8) -> Self {
        Self { service, quality }
    }

    /// Enumerate a borrowed title's pages.
    ///
    /// The descriptor index space is dense from 0 to page count - 1 and must
    /// match the count the service reports; a disagreement is a
    /// [`MetadataError::PageCountMismatch`], never a silent truncation.
    pub async fn enumerate(
        &self,
        session: &Session,
        loan: &Loan,
    ) -> Result<Enumeration, MetadataError> {
        let manifest = self.service.page_manifest(session, loan).await?;

        if manifest.page_count != manifest.locators.len() {
            return Err(MetadataError::PageCountMismatch {
                title: loan.title.to_string(),
                reported: manifest.page_count,
                enumerated: manifest.locators.len(),
            });
        }

        let pages: Vec<PageDescriptor> = manifest
            .locators
            .iter()
            .enumerate()
            .map(|(index, locator)| PageDescriptor {
                index,
                locator: self.page_url(locator),
                size_hint: None,
            })
            .collect();

        tracing::info!(
            title = %loan.title,
            pages = pages.len(),
            "Enumerated title pages"
        );
        Ok(Enumeration { manifest, pages })
    }

    /// Fetch one page's payload under a loan.
    pub async fn fetch_one(
        &self,
        session: &Session,
        loan: &Loan,
        descriptor: &PageDescriptor,
    ) -> Result<Vec<u8>, FetchError> {
        self.service.fetch_page(session, loan, descriptor).await
    }

    /// Append the rotation and quality selector to a page locator.
    fn page_url(&self, locator: &str) -> String {
        let separator = if locator.contains('?') { '&' } else { '?' };
        format!("{locator}{separator}rotate=0&scale={}", self.quality)
    }
}
