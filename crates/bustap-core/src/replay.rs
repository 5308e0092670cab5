//! Deterministic replay of scripted receive traffic.
//!
//! A replay script lists receive sessions as hex byte strings. Each session
//! is fed through an [`Analyzer`] using the receive handshake discipline
//! (active asserted one tick before the first byte, deasserted to end the
//! packet), the engine is allowed to settle, and the output stream is
//! drained and decoded into a [`CaptureReport`]. Sessions can opt out of
//! draining to leave bytes in the ring buffer and exercise the overrun path.

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::record::{RecordError, RecordEvent, decode_records};
use crate::{
    Analyzer, CaptureReport, ConfigError, DEFAULT_MEM_DEPTH, EngineError, RecordSummary, RxSample,
    make_base_report,
};

/// One scripted receive session.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    /// Packet bytes as a hex string (may be empty for a zero-length packet).
    pub bytes: String,
    /// Drain the output ring buffer after this session (default true).
    /// `false` leaves the bytes in place, raising the output level seen by
    /// later sessions.
    #[serde(default = "default_drain")]
    pub drain: bool,
}

fn default_drain() -> bool {
    true
}

/// A full replay script.
///
/// # Examples
/// ```
/// use bustap_core::ReplayScript;
///
/// let script: ReplayScript =
///     serde_json::from_str(r#"{"mem_depth":16,"sessions":[{"bytes":"aabb"}]}"#)?;
/// assert_eq!(script.mem_depth, Some(16));
/// assert_eq!(script.sessions.len(), 1);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    /// Output ring buffer depth; defaults to the engine default when absent.
    #[serde(default)]
    pub mem_depth: Option<usize>,
    /// Sessions in replay order.
    pub sessions: Vec<Session>,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("output stream error: {0}")]
    Record(#[from] RecordError),
    #[error("session {session}: invalid hex: {message}")]
    InvalidHex { session: usize, message: String },
}

/// Replay a script and aggregate the drained output into a report.
///
/// # Errors
/// Fails on invalid configuration, invalid session hex, an engine bound
/// violation, or a truncated output stream (the last would indicate an
/// engine bug rather than bad input).
pub fn run_replay(script: &ReplayScript) -> Result<CaptureReport, ReplayError> {
    let mem_depth = script.mem_depth.unwrap_or(DEFAULT_MEM_DEPTH);
    let mut analyzer = Analyzer::new(mem_depth)?;
    analyzer.set_capture_enable(true);
    analyzer.tick(RxSample::inactive())?;

    let mut drained = Vec::new();
    for (index, session) in script.sessions.iter().enumerate() {
        let bytes = decode_hex(&session.bytes).map_err(|message| ReplayError::InvalidHex {
            session: index,
            message,
        })?;
        feed_session(&mut analyzer, &bytes)?;
        analyzer.quiesce()?;
        if session.drain {
            drain_fully(&mut analyzer, &mut drained)?;
        }
    }
    drain_fully(&mut analyzer, &mut drained)?;

    let events = decode_records(&drained)?;
    let mut report = make_base_report(mem_depth);
    report.generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| crate::DEFAULT_GENERATED_AT.to_string());
    report.stats.sessions_total = script.sessions.len() as u64;
    report.stats.overrun = analyzer.status().overrun;
    for event in events {
        match event {
            RecordEvent::Packet(payload) => {
                report.stats.records_captured += 1;
                report.stats.bytes_captured += payload.len() as u64;
                report.records.push(RecordSummary {
                    kind: "packet".to_string(),
                    length: Some(payload.len() as u16),
                    payload: Some(encode_hex(&payload)),
                });
            }
            RecordEvent::Overrun => {
                report.stats.records_dropped += 1;
                report.records.push(RecordSummary {
                    kind: "overrun".to_string(),
                    length: None,
                    payload: None,
                });
            }
        }
    }
    Ok(report)
}

fn feed_session(analyzer: &mut Analyzer, bytes: &[u8]) -> Result<(), EngineError> {
    analyzer.tick(RxSample::active())?;
    for &byte in bytes {
        analyzer.tick(RxSample::byte(byte))?;
    }
    analyzer.tick(RxSample::inactive())
}

/// Drain until the engine has nothing more to emit. Draining can unpark a
/// transfer waiting for marker space, so settle and re-check after each pass.
fn drain_fully(analyzer: &mut Analyzer, drained: &mut Vec<u8>) -> Result<(), EngineError> {
    loop {
        analyzer.quiesce()?;
        if analyzer.output_level() == 0 {
            return Ok(());
        }
        while let Some(byte) = analyzer.read_output() {
            drained.push(byte);
        }
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(format!("odd number of digits ({})", text.len()));
    }
    let mut bytes = Vec::with_capacity(text.len() / 2);
    for chunk in text.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).map_err(|_| "non-ascii input".to_string())?;
        let byte = u8::from_str_radix(pair, 16).map_err(|_| format!("invalid digit pair '{pair}'"))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        text.push_str(&format!("{byte:02x}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::{ReplayScript, Session, decode_hex, encode_hex, run_replay};

    fn script(mem_depth: usize, sessions: Vec<Session>) -> ReplayScript {
        ReplayScript {
            mem_depth: Some(mem_depth),
            sessions,
        }
    }

    fn session(bytes: &str) -> Session {
        Session {
            bytes: bytes.to_string(),
            drain: true,
        }
    }

    #[test]
    fn decode_hex_accepts_empty_and_pairs() {
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("aaBB01").unwrap(), vec![0xAA, 0xBB, 0x01]);
    }

    #[test]
    fn decode_hex_rejects_odd_and_invalid() {
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn encode_hex_is_lowercase() {
        assert_eq!(encode_hex(&[0xAB, 0x01]), "ab01");
    }

    #[test]
    fn replay_captures_sessions_in_order() {
        let report = run_replay(&script(
            64,
            vec![session("aa"), session("bbcc"), session("")],
        ))
        .unwrap();

        assert_eq!(report.stats.sessions_total, 3);
        assert_eq!(report.stats.records_captured, 3);
        assert_eq!(report.stats.records_dropped, 0);
        assert_eq!(report.stats.bytes_captured, 3);
        assert!(!report.stats.overrun);

        assert_eq!(report.records[0].payload.as_deref(), Some("aa"));
        assert_eq!(report.records[1].payload.as_deref(), Some("bbcc"));
        assert_eq!(report.records[2].payload.as_deref(), Some(""));
        assert_eq!(report.records[2].length, Some(0));
    }

    #[test]
    fn undrained_session_provokes_overrun() {
        let sessions = vec![
            Session {
                bytes: "010203040506".to_string(),
                drain: false,
            },
            session("aabbcc"),
        ];
        let report = run_replay(&script(8, sessions)).unwrap();

        assert!(report.stats.overrun);
        assert_eq!(report.stats.records_captured, 1);
        assert_eq!(report.stats.records_dropped, 1);
        assert_eq!(report.records[0].payload.as_deref(), Some("010203040506"));
        assert_eq!(report.records[1].kind, "overrun");
    }

    #[test]
    fn invalid_session_hex_names_the_session() {
        let err = run_replay(&script(8, vec![session("aa"), session("xy")])).unwrap_err();
        assert!(err.to_string().contains("session 1"));
    }

    #[test]
    fn script_mem_depth_is_validated() {
        let err = run_replay(&script(6, vec![session("aa")])).unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }
}
