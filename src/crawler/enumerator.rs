//! Paged walk over the catalog's package identifiers
//!
//! The catalog may grow while a run is in progress, so a single empty page is
//! not taken as the end: enumeration stops only after a configured number of
//! consecutive empty pages.

use crate::storage::{Storage, StorageResult};
use crate::url::has_binary_extension;

/// Anything that can serve a page of package identifiers
pub trait PageSource {
    fn fetch_page(&self, offset: u64, limit: u64) -> StorageResult<Vec<String>>;
}

impl<S: Storage + ?Sized> PageSource for S {
    fn fetch_page(&self, offset: u64, limit: u64) -> StorageResult<Vec<String>> {
        self.query_packages(offset, limit)
    }
}

/// One non-empty page handed to the crawl loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based page index the identifiers came from
    pub index: u64,

    /// Offset the page was requested at
    pub offset: u64,

    pub identifiers: Vec<String>,
}

/// Walks the catalog page by page until it runs dry
#[derive(Debug, Clone)]
pub struct PackageEnumerator {
    page_size: u64,
    max_empty_pages: u32,
    page_index: u64,
    empty_streak: u32,
}

impl PackageEnumerator {
    pub fn new(page_size: u64, max_empty_pages: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            max_empty_pages: max_empty_pages.max(1),
            page_index: 0,
            empty_streak: 0,
        }
    }

    /// Returns the next non-empty page, or `None` once enumeration has ended
    ///
    /// Empty pages are consumed internally: each one bumps the empty streak,
    /// each non-empty page resets it, and reaching `max_empty_pages` ends the
    /// walk for good. Store errors are returned as-is.
    pub fn next_page<P: PageSource + ?Sized>(&mut self, source: &P) -> StorageResult<Option<Page>> {
        while !self.is_finished() {
            let index = self.page_index;
            let offset = index * self.page_size;
            let identifiers = source.fetch_page(offset, self.page_size)?;
            self.page_index += 1;

            if identifiers.is_empty() {
                self.empty_streak += 1;
                tracing::debug!(
                    "Empty page {} at offset {} ({}/{})",
                    index,
                    offset,
                    self.empty_streak,
                    self.max_empty_pages
                );
                continue;
            }

            self.empty_streak = 0;
            return Ok(Some(Page {
                index,
                offset,
                identifiers,
            }));
        }

        Ok(None)
    }

    /// Returns true once the empty-page limit has been reached
    pub fn is_finished(&self) -> bool {
        self.empty_streak >= self.max_empty_pages
    }

    /// Number of pages requested so far, empty ones included
    pub fn pages_requested(&self) -> u64 {
        self.page_index
    }
}

/// Decides whether an identifier needs a probe at all
///
/// Empty identifiers and ones that already look like a binary file name are
/// skipped.
pub fn should_probe(identifier: &str, skip_extensions: &[String]) -> bool {
    !identifier.trim().is_empty() && !has_binary_extension(identifier, skip_extensions)
}
