//! Severity lookup for panel event identifiers
//!
//! Severities are loaded externally (one table per panel model) and passed
//! in as a read-only lookup. An identifier missing from the table resolves
//! to [`SeverityTable::UNRECOGNIZED`]; that default must never suppress
//! delivery, only lower the event's priority downstream.

use std::collections::HashMap;

/// Read-only mapping from event identifier to integer severity
#[derive(Debug, Clone, Default)]
pub struct SeverityTable {
    levels: HashMap<String, i32>,
}

impl SeverityTable {
    /// Severity assigned to identifiers not present in the table
    pub const UNRECOGNIZED: i32 = 0;

    /// Create a table from a prepared mapping
    pub fn new(levels: HashMap<String, i32>) -> Self {
        Self { levels }
    }

    /// Look up the severity for an event identifier
    pub fn severity_of(&self, event_id: &str) -> i32 {
        self.levels
            .get(event_id)
            .copied()
            .unwrap_or(Self::UNRECOGNIZED)
    }

    /// Number of identifiers in the table
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True if the table carries no identifiers
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl FromIterator<(String, i32)> for SeverityTable {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SeverityTable;

    #[test]
    fn test_known_identifier() {
        let table: SeverityTable = [("HUMO ACT".to_string(), 3)].into_iter().collect();
        assert_eq!(table.severity_of("HUMO ACT"), 3);
    }

    #[test]
    fn test_unknown_identifier_defaults_to_zero() {
        let table = SeverityTable::default();
        assert_eq!(table.severity_of("NO SUCH EVENT"), SeverityTable::UNRECOGNIZED);
    }
}
