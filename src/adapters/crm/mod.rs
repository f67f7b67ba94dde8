//! CRM page fetching
//!
//! [`PageFetcher`] is the seam between the export loop and the remote API.
//! [`CrmClient`] is the HTTP implementation.

pub mod client;
pub mod rate_limit;

pub use client::CrmClient;
pub use rate_limit::RateLimiter;

use crate::domain::{CrmError, DateFilter, EntityKind, Record};
use async_trait::async_trait;

/// One page of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records in API order
    pub records: Vec<Record>,
    /// Whether a further page exists
    pub has_more: bool,
}

impl Page {
    pub fn new(records: Vec<Record>, has_more: bool) -> Self {
        Self { records, has_more }
    }

    /// Empty last page
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fetches one numbered page of an entity
///
/// `page` starts at 1. Implementations have no side effects beyond the
/// remote call. Errors are classified by [`CrmError::is_transient`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        entity: EntityKind,
        page: u32,
        filter: &DateFilter,
    ) -> Result<Page, CrmError>;

    /// Current state of one record, `None` once the CRM no longer has it
    async fn fetch_record(&self, entity: EntityKind, id: &str) -> Result<Option<Record>, CrmError>;
}
