// Event source backed by a JSON-lines feed file
//
// Each non-empty line is either a custom attribute definition
//   {"record": "field", "key": 101, "name": "dhcp.ntp-server", "scope": "virtual_machine"}
// or an event
//   {"record": "event", "key": 1, "kind": "created", "created_at": "...", "vm": {...}}
// Lines starting with '#' are comments. The file is re-read for every
// window, so it can keep growing while the daemon runs. A line that cannot
// be decoded is skipped and reported once; only I/O errors fail a window.

use crate::inventory::{CustomFieldDef, VmEvent};
use crate::source::{EventSource, SourceError};
use crate::telemetry::Endpoints;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// One line of the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum FeedRecord {
    Event(VmEvent),
    Field(CustomFieldDef),
}

/// File-backed event source
pub struct FeedSource {
    path: PathBuf,
    endpoints: Endpoints,
    /// Undecodable lines already reported
    malformed: HashSet<String>,
}

impl FeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let endpoints = Endpoints::new(path.display().to_string(), "");
        Self {
            path,
            endpoints,
            malformed: HashSet::new(),
        }
    }

    /// Label skipped-line failures with the daemon's endpoints
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Distinct undecodable lines seen so far
    pub fn malformed_lines(&self) -> usize {
        self.malformed.len()
    }

    /// Feed source over an existing file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Self::new(path)),
            Ok(_) => Err(SourceError::Unavailable(format!("{:?} is not a file", path))),
            Err(e) => Err(SourceError::Unavailable(format!(
                "cannot open feed {:?}: {}",
                path, e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&mut self) -> Result<Vec<FeedRecord>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("cannot read feed {:?}: {}", self.path, e))
        })?;

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => self.report_malformed(idx + 1, line, e),
            }
        }
        Ok(records)
    }

    fn report_malformed(&mut self, line_no: usize, line: &str, e: serde_json::Error) {
        if !self.malformed.insert(line.to_string()) {
            return;
        }
        let err = SourceError::Malformed {
            line: line_no,
            message: e.to_string(),
        };
        tracing::warn!("Skipping feed line of {}: {}", self.path.display(), err);
        self.endpoints.failure(err.kind());
    }
}

#[async_trait]
impl EventSource for FeedSource {
    type Handle = VecDeque<VmEvent>;

    fn endpoint(&self) -> String {
        format!("feed:{}", self.path.display())
    }

    async fn open_window(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self::Handle, SourceError> {
        let mut events: Vec<VmEvent> = self
            .read_records()
            .await?
            .into_iter()
            .filter_map(|record| match record {
                FeedRecord::Event(event) => Some(event),
                FeedRecord::Field(_) => None,
            })
            .filter(|event| event.created_at >= start && event.created_at <= end)
            .collect();

        // stable: equal timestamps keep feed order
        events.sort_by_key(|event| event.created_at);
        Ok(events.into())
    }

    async fn read_next(
        &mut self,
        handle: &mut Self::Handle,
        max: usize,
    ) -> Result<Vec<VmEvent>, SourceError> {
        let count = max.min(handle.len());
        Ok(handle.drain(..count).collect())
    }

    async fn close(&mut self, _handle: Self::Handle) -> Result<(), SourceError> {
        Ok(())
    }

    async fn custom_fields(&mut self) -> Result<Vec<CustomFieldDef>, SourceError> {
        Ok(self
            .read_records()
            .await?
            .into_iter()
            .filter_map(|record| match record {
                FeedRecord::Field(field) => Some(field),
                FeedRecord::Event(_) => None,
            })
            .collect())
    }
}
