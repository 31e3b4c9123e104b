//! Edwards iO1000 panel dialect
//!
//! The iO1000 prints one event per message. Depending on firmware and
//! printer configuration the identifier and metadata are separated either
//! by a pipe or by a run of spaces:
//!
//! - `HUMO ACT|12:30P 102325 Detalles`
//! - `ACTIVA SLENC.REMOTO SILENCIO PANEL    07:58A 102325 1M002`
//!
//! Both surface syntaxes carry the same semantic fields, so the parser
//! tries the pipe form first and falls back to the whitespace-run form.
//! Continuation lines (panels sometimes wrap long device labels) are
//! appended to the description.

use std::time::SystemTime;

use crate::error::ParseError;
use crate::event::PanelEvent;
use crate::fields::{split_timestamp, split_wide_gap};
use crate::severity::SeverityTable;
use crate::{PanelModel, PanelParser};

/// Parser for the Edwards iO1000 line grammar
pub struct EdwardsIo1000 {
    severity: SeverityTable,
}

impl EdwardsIo1000 {
    /// Create a parser with the model's severity table
    pub fn new(severity: SeverityTable) -> Self {
        Self { severity }
    }

    /// Split the first line into identifier and metadata, trying the pipe
    /// form before the whitespace-run fallback.
    fn split_first_line(line: &str) -> Result<(&str, &str), ParseError> {
        if let Some((id, metadata)) = line.split_once('|') {
            let id = id.trim();
            let metadata = metadata.trim();
            if id.is_empty() || metadata.is_empty() {
                return Err(ParseError::MissingSeparator(line.to_string()));
            }
            return Ok((id, metadata));
        }
        split_wide_gap(line).ok_or_else(|| ParseError::MissingSeparator(line.to_string()))
    }
}

impl PanelParser for EdwardsIo1000 {
    fn model(&self) -> PanelModel {
        PanelModel::EdwardsIo1000
    }

    fn parse(&self, message: &str) -> Result<PanelEvent, ParseError> {
        let mut lines = message.lines().map(str::trim).filter(|l| !l.is_empty());
        let first = lines.next().ok_or(ParseError::EmptyMessage)?;

        let (id, metadata) = Self::split_first_line(first)?;
        let (panel_timestamp, details) = split_timestamp(metadata)
            .ok_or_else(|| ParseError::MissingTimestamp(first.to_string()))?;

        let mut description = details.join(" | ");
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
