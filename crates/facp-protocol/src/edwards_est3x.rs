//! Edwards EST-3X panel dialect
//!
//! EST-3X printer output always uses the pipe form
//! (`ID|TIME DATE DETAILS`); there is no column-aligned variant on this
//! family. Field semantics match the iO1000.

use std::time::SystemTime;

use crate::error::ParseError;
use crate::event::PanelEvent;
use crate::fields::split_timestamp;
use crate::severity::SeverityTable;
use crate::{PanelModel, PanelParser};

/// Parser for the Edwards EST-3X line grammar
pub struct EdwardsEst3x {
    severity: SeverityTable,
}

impl EdwardsEst3x {
    /// Create a parser with the model's severity table
    pub fn new(severity: SeverityTable) -> Self {
        Self { severity }
    }
}

impl PanelParser for EdwardsEst3x {
    fn model(&self) -> PanelModel {
        PanelModel::EdwardsEst3x
    }

    fn parse(&self, message: &str) -> Result<PanelEvent, ParseError> {
        let mut lines = message.lines().map(str::trim).filter(|l| !l.is_empty());
        let first = lines.next().ok_or(ParseError::EmptyMessage)?;

        let (id, metadata) = first
            .split_once('|')
            .map(|(id, metadata)| (id.trim(), metadata.trim()))
            .filter(|(id, metadata)| !id.is_empty() && !metadata.is_empty())
            .ok_or_else(|| ParseError::MissingSeparator(first.to_string()))?;

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

#[cfg(test)]
mod tests {
    use super::EdwardsEst3x;
    use crate::{PanelParser, ParseError};

    fn parser() -> EdwardsEst3x {
        EdwardsEst3x::new([("ALARMA GENERAL".to_string(), 4)].into_iter().collect())
    }

    #[test]
    fn test_parse_pipe_form() {
        let event = parser()
            .parse("ALARMA GENERAL|10:15A 110325 LAZO 1")
            .unwrap();
        assert_eq!(event.id, "ALARMA GENERAL");
        assert_eq!(event.panel_timestamp, "10:15A 110325");
        assert_eq!(event.description, "LAZO | 1");
        assert_eq!(event.severity, 4);
    }

    #[test]
    fn test_whitespace_form_is_rejected() {
        let err = parser()
            .parse("ALARMA GENERAL    10:15A 110325 LAZO 1")
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingSeparator(_)));
    }
}
