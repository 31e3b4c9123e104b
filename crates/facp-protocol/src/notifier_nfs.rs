//! Notifier NFS panel dialect
//!
//! NFS-series printers emit column-aligned output only: the identifier
//! column is separated from the metadata by a run of spaces, and detail
//! tokens read as free text (joined with single spaces rather than the
//! Edwards-style pipe separators).

use std::time::SystemTime;

use crate::error::ParseError;
use crate::event::PanelEvent;
use crate::fields::{split_timestamp, split_wide_gap};
use crate::severity::SeverityTable;
use crate::{PanelModel, PanelParser};

/// Parser for the Notifier NFS line grammar
pub struct NotifierNfs {
    severity: SeverityTable,
}

impl NotifierNfs {
    /// Create a parser with the model's severity table
    pub fn new(severity: SeverityTable) -> Self {
        Self { severity }
    }
}

impl PanelParser for NotifierNfs {
    fn model(&self) -> PanelModel {
        PanelModel::NotifierNfs
    }

    fn parse(&self, message: &str) -> Result<PanelEvent, ParseError> {
        let mut lines = message.lines().map(str::trim).filter(|l| !l.is_empty());
        let first = lines.next().ok_or(ParseError::EmptyMessage)?;

        let (id, metadata) = split_wide_gap(first)
            .ok_or_else(|| ParseError::MissingSeparator(first.to_string()))?;

        let (panel_timestamp, details) = split_timestamp(metadata)
            .ok_or_else(|| ParseError::MissingTimestamp(first.to_string()))?;

        let mut description = details.join(" ");
        for extra in lines {
            if !description.is_empty() {
                description.push('\n');
            }
            description.push_str(extra);
        }

        Ok(PanelEvent {
            id: id.to_string(),
            severity: self.severity.severity_of(id),
            description,
            panel_timestamp,
            received_at: SystemTime::now(),
        })
    }
}
