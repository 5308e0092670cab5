//! BusTap core library: a real-time packet capture engine.
//!
//! This crate implements the capture pipeline used by the CLI: a byte-level
//! receive handshake feeds the capture front-end, which stages each complete
//! packet and queues its length; the transfer engine drains queued packets
//! into a bounded output ring buffer as length-prefixed records, substituting
//! a two-byte overrun marker (and latching a sticky flag) whenever a record
//! cannot fit. A slower consumer pulls the record stream at its own pace;
//! backpressure shows up as overrun, never as a stalled capture path.
//!
//! Invariants:
//! - Records leave the engine in exactly the order their packets completed.
//! - The sum of queued lengths never exceeds the staged byte count; a dropped
//!   packet's bytes are fully discarded so later records stay aligned.
//! - The overrun flag only transitions false -> true for an engine's lifetime.
//!
//! # Examples
//! ```no_run
//! use bustap_core::{ReplayScript, run_replay};
//!
//! let script: ReplayScript = serde_json::from_str(r#"{"sessions":[{"bytes":"aabbcc"}]}"#)?;
//! let report = run_replay(&script)?;
//! println!("records: {}", report.records.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

mod engine;
mod queue;
pub mod record;
pub mod replay;

pub use engine::{Analyzer, ConfigError, EngineError, RxSample, Status};
pub use queue::BoundedQueue;
pub use replay::{ReplayError, ReplayScript, Session, run_replay};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Default timestamp used when no wall-clock time is available.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

/// Width of the record length prefix, in bytes.
pub const HEADER_SIZE_BYTES: usize = 2;
/// Maximum staged packet: 1024 payload bytes plus a 1-byte id and a 2-byte
/// checksum, none of which are interpreted here.
pub const MAX_PACKET_SIZE_BYTES: usize = 1024 + 1 + 2;
/// Depth of the pending-lengths queue, in entries.
pub const LENGTH_QUEUE_DEPTH: usize = 512;
/// Default output ring buffer depth, in bytes.
pub const DEFAULT_MEM_DEPTH: usize = 65536;
/// Reserved length value marking a dropped record. Real records are capped
/// well below it, so the marker is unambiguous in the stream.
pub const OVERRUN_MARKER: u16 = 0xFFFF;

/// Replay report with deterministic record ordering.
///
/// # Examples
/// ```
/// use bustap_core::make_base_report;
///
/// let report = make_base_report(64);
/// assert_eq!(report.report_version, bustap_core::REPORT_VERSION);
/// assert_eq!(report.config.mem_depth, 64);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReport {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    /// Tool identification metadata.
    pub tool: ToolInfo,
    /// RFC3339 timestamp representing the report generation time.
    pub generated_at: String,
    /// Engine configuration the replay ran with.
    pub config: ConfigInfo,
    /// Records in the order they left the engine.
    pub records: Vec<RecordSummary>,
    /// Aggregate counters for the whole replay.
    pub stats: CaptureStats,
}

/// Tool metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (e.g., "bustap").
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Engine configuration echoed into the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Output ring buffer depth, in bytes.
    pub mem_depth: usize,
}

/// One record of the output stream.
///
/// # Examples
/// ```
/// use bustap_core::RecordSummary;
///
/// let record = RecordSummary {
///     kind: "packet".to_string(),
///     length: Some(3),
///     payload: Some("aabbcc".to_string()),
/// };
/// assert_eq!(record.length, Some(3));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSummary {
    /// Record kind: `packet` or `overrun`.
    pub kind: String,
    /// Payload length in bytes (absent for overrun markers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
    /// Payload as lowercase hex (absent for overrun markers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Aggregate counters for one replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Number of receive sessions fed to the engine.
    pub sessions_total: u64,
    /// Records delivered intact.
    pub records_captured: u64,
    /// Records replaced by the overrun marker.
    pub records_dropped: u64,
    /// Payload bytes delivered intact.
    pub bytes_captured: u64,
    /// Final state of the sticky overrun flag.
    pub overrun: bool,
}

/// Build a report with base fields filled and empty aggregates.
///
/// # Examples
/// ```
/// use bustap_core::make_base_report;
///
/// let report = make_base_report(1024);
/// assert!(report.records.is_empty());
/// assert!(!report.stats.overrun);
/// ```
pub fn make_base_report(mem_depth: usize) -> CaptureReport {
    CaptureReport {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "bustap".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at: DEFAULT_GENERATED_AT.to_string(),
        config: ConfigInfo { mem_depth },
        records: Vec::new(),
        stats: CaptureStats {
            sessions_total: 0,
            records_captured: 0,
            records_dropped: 0,
            bytes_captured: 0,
            overrun: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_omits_optional_fields_for_overrun_records() {
        let mut report = make_base_report(8);
        report.records.push(RecordSummary {
            kind: "overrun".to_string(),
            length: None,
            payload: None,
        });

        let value = serde_json::to_value(&report).expect("report json");
        let record = &value["records"][0];
        assert_eq!(record["kind"], "overrun");
        assert!(record.get("length").is_none());
        assert!(record.get("payload").is_none());
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut report = make_base_report(16);
        report.records.push(RecordSummary {
            kind: "packet".to_string(),
            length: Some(2),
            payload: Some("aabb".to_string()),
        });
        report.stats.records_captured = 1;
        report.stats.bytes_captured = 2;

        let json = serde_json::to_string(&report).expect("serialize");
        let parsed: CaptureReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.config.mem_depth, 16);
        assert_eq!(parsed.records[0].payload.as_deref(), Some("aabb"));
    }
}
