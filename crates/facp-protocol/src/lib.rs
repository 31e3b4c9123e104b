//! FACP Protocol Library
//!
//! This crate provides message framing and event parsing for the
//! line-oriented serial protocols spoken by fire-alarm control panels:
//!
//! - **Edwards iO1000**: hybrid pipe-delimited / column-aligned events
//! - **Edwards EST-3X**: pipe-delimited events
//! - **Notifier NFS**: column-aligned events
//! - **Simplex**: column-aligned events with a leading sequence counter
//!
//! # Architecture
//!
//! [`FrameAssembler`] reconstructs complete messages from a stream of
//! decoded lines using the family's framing heuristics (terminal
//! timestamp lines, report-delimiter counting, empty-line markers, idle
//! timeout). Each panel model provides a [`PanelParser`] implementation
//! that turns one assembled message into a [`PanelEvent`]; the variant is
//! selected once at startup via [`create_panel_parser`].
//!
//! # Example
//!
//! ```rust
//! use facp_protocol::{create_panel_parser, PanelModel, PanelParser, SeverityTable};
//!
//! let table: SeverityTable = [("HUMO ACT".to_string(), 3)].into_iter().collect();
//! let parser = create_panel_parser(PanelModel::EdwardsIo1000, table);
//!
//! let event = parser.parse("HUMO ACT|12:30P 102325 Detalles").unwrap();
//! assert_eq!(event.id, "HUMO ACT");
//! assert_eq!(event.panel_timestamp, "12:30P 102325");
//! assert_eq!(event.severity, 3);
//! ```

pub mod edwards_est3x;
pub mod edwards_io1000;
pub mod error;
pub mod event;
pub mod fields;
pub mod frame;
pub mod notifier_nfs;
pub mod severity;
pub mod simplex;

pub use error::ParseError;
pub use event::PanelEvent;
pub use frame::{AssemblerConfig, Frame, FrameAssembler, FrameKind};
pub use severity::SeverityTable;

/// Identifies which panel model's dialect a serial link speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PanelModel {
    /// Edwards iO1000 (hybrid pipe/column grammar)
    EdwardsIo1000,
    /// Edwards EST-3X (pipe grammar)
    EdwardsEst3x,
    /// Notifier NFS series (column grammar)
    NotifierNfs,
    /// Simplex 4100 series (column grammar with sequence counter)
    Simplex,
}

impl PanelModel {
    /// Resolve a configured numeric model identifier
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            10001 => Some(PanelModel::EdwardsIo1000),
            10002 => Some(PanelModel::EdwardsEst3x),
            10003 => Some(PanelModel::NotifierNfs),
            10004 => Some(PanelModel::Simplex),
            _ => None,
        }
    }

    /// The numeric identifier used in configuration and severity tables
    pub fn id(&self) -> u32 {
        match self {
            PanelModel::EdwardsIo1000 => 10001,
            PanelModel::EdwardsEst3x => 10002,
            PanelModel::NotifierNfs => 10003,
            PanelModel::Simplex => 10004,
        }
    }

    /// Returns a human-readable name for the panel model
    pub fn name(&self) -> &'static str {
        match self {
            PanelModel::EdwardsIo1000 => "Edwards iO1000",
            PanelModel::EdwardsEst3x => "Edwards EST-3X",
            PanelModel::NotifierNfs => "Notifier NFS",
            PanelModel::Simplex => "Simplex",
        }
    }
}

/// Trait for panel dialect parsers
///
/// Object-safe so the pipeline can hold a `Box<dyn PanelParser>` selected
/// once at startup. Implementations must be pure with respect to the
/// message text: parsing the same buffer twice yields events that agree on
/// every panel-controlled field (only the receipt timestamp may differ).
pub trait PanelParser: Send + Sync {
    /// The model this parser understands
    fn model(&self) -> PanelModel;

    /// Parse one assembled message into an event
    fn parse(&self, message: &str) -> Result<PanelEvent, ParseError>;
}

/// Create the dialect parser for the given panel model
pub fn create_panel_parser(model: PanelModel, severity: SeverityTable) -> Box<dyn PanelParser> {
    match model {
        PanelModel::EdwardsIo1000 => Box::new(edwards_io1000::EdwardsIo1000::new(severity)),
        PanelModel::EdwardsEst3x => Box::new(edwards_est3x::EdwardsEst3x::new(severity)),
        PanelModel::NotifierNfs => Box::new(notifier_nfs::NotifierNfs::new(severity)),
        PanelModel::Simplex => Box::new(simplex::Simplex::new(severity)),
    }
}
