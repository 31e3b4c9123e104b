//! Parsed panel event record

use std::time::SystemTime;

/// A single event parsed from an assembled panel message.
///
/// Immutable once created. `panel_timestamp` carries the panel's own
/// embedded date/time field verbatim (e.g. `12:30P 102325`); `received_at`
/// is stamped from the local clock at parse time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PanelEvent {
    /// Event identifier as printed by the panel (e.g. `HUMO ACT`)
    pub id: String,
    /// Human-readable details extracted from the message
    pub description: String,
    /// Severity from the lookup table; 0 = unrecognized identifier
    pub severity: i32,
    /// The panel's own date/time field, verbatim
    pub panel_timestamp: String,
    /// Local receipt timestamp
    pub received_at: SystemTime,
}

impl PanelEvent {
    /// Structural equality ignoring the receipt timestamp.
    ///
    /// Parsing the same buffer twice must yield events that agree on every
    /// field the panel controls; only `received_at` may differ.
    pub fn same_content(&self, other: &PanelEvent) -> bool {
        self.id == other.id
            && self.description == other.description
            && self.severity == other.severity
            && self.panel_timestamp == other.panel_timestamp
    }
}
