//! Streaming assembly of panel messages from decoded serial lines
//!
//! Panels in this family do not length-prefix their output. A message is
//! complete when one of three heuristics fires:
//!
//! - a *terminal* line arrives (trailing `HH:MM[AP] DDMMYY WORD` field),
//! - an *empty* line arrives while a buffer is accumulating, or
//! - the line stream goes idle past the configured window while a buffer
//!   is non-empty (bounds latency for panels that never print a clean
//!   terminator).
//!
//! Multi-line *reports* are recognized by counting occurrences of a
//! configurable delimiter marker; they flush as [`FrameKind::Report`] and
//! are dropped (with a log record) downstream, never parsed as events.

use std::time::{Duration, Instant};

use crate::fields::ends_with_panel_timestamp;

/// Default idle window after which a non-empty buffer is force-flushed
pub const DEFAULT_IDLE_FLUSH: Duration = Duration::from_secs(2);

/// Framing heuristics configuration
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Marker identifying report-delimiter lines; `None` disables report
    /// detection entirely
    pub report_delimiter: Option<String>,
    /// Delimiter count at which an accumulated report is considered
    /// complete
    pub max_report_delimiters: u32,
    /// Idle window for the timeout flush
    pub idle_flush: Duration,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            report_delimiter: None,
            max_report_delimiters: 0,
            idle_flush: DEFAULT_IDLE_FLUSH,
        }
    }
}

/// How a flushed frame should be routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A single panel event; handed to the dialect parser
    Event,
    /// A multi-part report; unsupported downstream, logged and dropped
    Report,
}

/// One complete assembled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Assembled text, contributing lines joined with `\n`
    pub text: String,
    /// Routing classification at flush time
    pub kind: FrameKind,
}

/// Accumulates decoded lines until a completion heuristic fires
#[derive(Debug)]
pub struct FrameAssembler {
    config: AssemblerConfig,
    buffer: String,
    delimiter_count: u32,
    last_activity: Option<Instant>,
}

impl FrameAssembler {
    /// Create an assembler with the given heuristics
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            delimiter_count: 0,
            last_activity: None,
        }
    }

    /// True if nothing is currently accumulating
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume one decoded line; returns a frame if the line completed a
    /// message.
    pub fn feed(&mut self, line: &str, now: Instant) -> Option<Frame> {
        let line = line.trim();

        if line.is_empty() {
            return self.feed_empty_line();
        }

        self.last_activity = Some(now);

        if let Some(delimiter) = &self.config.report_delimiter {
            if !delimiter.is_empty() && line.contains(delimiter.as_str()) {
                self.delimiter_count += 1;
                tracing::debug!(
                    "report delimiter detected, count: {}",
                    self.delimiter_count
                );
                self.push_line(line);
                return None;
            }
        }

        if ends_with_panel_timestamp(line) {
            // A terminal line mid-report still flushes as an event unless
            // the delimiter count already reached the configured maximum.
            let kind = if self.report_complete() {
                FrameKind::Report
            } else {
                FrameKind::Event
            };
            if self.buffer.is_empty() {
                tracing::debug!("complete single-line message detected");
                return Self::frame(line.to_string(), kind);
            }
            tracing::debug!("complete multi-line message detected");
            self.buffer.push_str(line);
            return self.flush(kind);
        }

        self.push_line(line);
        tracing::debug!("partial line accumulated, buffer: {} chars", self.buffer.len());
        None
    }

    /// Flush the buffer if the stream has been idle past the configured
    /// window. Call on every read-timeout tick.
    pub fn flush_on_timeout(&mut self, now: Instant) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let idle = self
            .last_activity
            .map(|t| now.saturating_duration_since(t))?;
        if idle < self.config.idle_flush {
            return None;
        }
        tracing::debug!("message timeout, flushing accumulated buffer");
        let kind = self.pending_kind();
        self.flush(kind)
    }

    /// Flush whatever is accumulated, regardless of heuristics. Used when
    /// the link faults so nothing already read is silently lost.
    pub fn flush_remaining(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let kind = self.pending_kind();
        self.flush(kind)
    }

    fn feed_empty_line(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.report_complete() {
            tracing::debug!("report delimiter count reached, flushing report");
            return self.flush(FrameKind::Report);
        }
        if self.delimiter_count == 0 && !self.buffer.trim().is_empty() {
            tracing::debug!("empty line terminates accumulated event");
            return self.flush(FrameKind::Event);
        }
        // Mid-report blank line, keep accumulating
        None
    }

    fn push_line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
    }

    fn report_complete(&self) -> bool {
        self.config.max_report_delimiters > 0
            && self.delimiter_count >= self.config.max_report_delimiters
    }

    fn pending_kind(&self) -> FrameKind {
        if self.delimiter_count > 0 {
            FrameKind::Report
        } else {
            FrameKind::Event
        }
    }

    fn flush(&mut self, kind: FrameKind) -> Option<Frame> {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        self.delimiter_count = 0;
        Self::frame(text, kind)
    }

    fn frame(text: String, kind: FrameKind) -> Option<Frame> {
        if text.is_empty() {
            None
        } else {
            Some(Frame { text, kind })
        }
    }
}
