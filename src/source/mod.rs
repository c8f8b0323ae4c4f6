//! Virtualization event source interface
//!
//! Events are requested per time window. A window is opened, read page by
//! page until an empty page comes back, then closed.

mod feed;

pub use feed::{FeedRecord, FeedSource};

use crate::inventory::{CustomFieldDef, VmEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by an event source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The platform cannot be reached right now
    #[error("Event source unavailable: {0}")]
    Unavailable(String),

    /// Reading from an open window failed
    #[error("Event read failed: {0}")]
    Read(String),

    /// The platform returned data that cannot be decoded
    #[error("Malformed record at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

impl SourceError {
    /// Label used when counting the failure
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "source_unavailable",
            SourceError::Read(_) => "source_read",
            SourceError::Malformed { .. } => "source_malformed",
        }
    }
}

/// Source of VM events.
///
/// Events of one window must come back in non-decreasing creation time.
#[async_trait]
pub trait EventSource: Send {
    /// Cursor over an open window
    type Handle: Send;

    /// Endpoint identity, for logs
    fn endpoint(&self) -> String;

    /// Open a window over events created within `[start, end]`
    async fn open_window(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self::Handle, SourceError>;

    /// Next page of at most `max` events; empty once the window is drained
    async fn read_next(
        &mut self,
        handle: &mut Self::Handle,
        max: usize,
    ) -> Result<Vec<VmEvent>, SourceError>;

    async fn close(&mut self, handle: Self::Handle) -> Result<(), SourceError>;

    /// Custom attribute definitions currently held by the platform
    async fn custom_fields(&mut self) -> Result<Vec<CustomFieldDef>, SourceError>;
}
