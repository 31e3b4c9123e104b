//! Simplex panel dialect
//!
//! Simplex 4100-series printers prefix each line with a numeric sequence
//! counter (`0042  PERDIDA SUPERVISION ...`). The counter is stripped
//! before the column split; the rest of the grammar is column-aligned like
//! the Notifier family.

use std::time::SystemTime;

use crate::error::ParseError;
use crate::event::PanelEvent;
use crate::fields::{split_timestamp, split_wide_gap};
use crate::severity::SeverityTable;
use crate::{PanelModel, PanelParser};

/// Parser for the Simplex line grammar
pub struct Simplex {
    severity: SeverityTable,
}

impl Simplex {
    /// Create a parser with the model's severity table
    pub fn new(severity: SeverityTable) -> Self {
        Self { severity }
    }

    /// Drop a leading all-digit sequence counter, if present.
    fn strip_sequence_counter(line: &str) -> &str {
        match line.split_once(char::is_whitespace) {
            Some((first, rest)) if !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit()) => {
                rest.trim_start()
            }
            _ => line,
        }
    }
}

impl PanelParser for Simplex {
    fn model(&self) -> PanelModel {
        PanelModel::Simplex
    }

    fn parse(&self, message: &str) -> Result<PanelEvent, ParseError> {
        let mut lines = message.lines().map(str::trim).filter(|l| !l.is_empty());
        let first = lines.next().ok_or(ParseError::EmptyMessage)?;
        let stripped = Self::strip_sequence_counter(first);

        let (id, metadata) = split_wide_gap(stripped)
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

#[cfg(test)]
mod tests {
    use super::Simplex;
    use crate::PanelParser;

    fn parser() -> Simplex {
        Simplex::new([("PERDIDA SUPERVISION".to_string(), 2)].into_iter().collect())
    }

    #[test]
    fn test_sequence_counter_is_stripped() {
        let event = parser()
            .parse("0042 PERDIDA SUPERVISION      11:02P 102925 LAZO 3")
            .unwrap();
        assert_eq!(event.id, "PERDIDA SUPERVISION");
        assert_eq!(event.panel_timestamp, "11:02P 102925");
        assert_eq!(event.description, "LAZO 3");
        assert_eq!(event.severity, 2);
    }

    #[test]
    fn test_line_without_counter_still_parses() {
        let event = parser()
            .parse("PERDIDA SUPERVISION      11:02P 102925 LAZO 3")
            .unwrap();
        assert_eq!(event.id, "PERDIDA SUPERVISION");
    }
}
