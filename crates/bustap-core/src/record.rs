//! Framing walk over a drained output stream.
//!
//! Splits the raw byte stream produced by the engine back into records using
//! the length-prefix grammar. Packet contents are not interpreted here; this
//! is only the framing a downstream consumer needs to stay byte-aligned.

use thiserror::Error;

use crate::OVERRUN_MARKER;

/// One framed unit of the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// A captured packet's payload bytes.
    Packet(Vec<u8>),
    /// A dropped record's marker; no payload follows it.
    Overrun,
}

#[derive(Debug, Error)]
pub enum RecordError {
    /// The stream ended inside a record.
    #[error("truncated record: expected {expected} more bytes, {available} available")]
    Truncated { expected: usize, available: usize },
}

/// Decode a drained output stream into records.
///
/// # Examples
/// ```
/// use bustap_core::record::{RecordEvent, decode_records};
///
/// let stream = [0x00, 0x02, 0xAA, 0xBB, 0xFF, 0xFF, 0x00, 0x00];
/// let records = decode_records(&stream)?;
/// assert_eq!(records.len(), 3);
/// assert_eq!(records[0], RecordEvent::Packet(vec![0xAA, 0xBB]));
/// assert_eq!(records[1], RecordEvent::Overrun);
/// assert_eq!(records[2], RecordEvent::Packet(Vec::new()));
/// # Ok::<(), bustap_core::record::RecordError>(())
/// ```
///
/// # Errors
/// Returns [`RecordError::Truncated`] when the stream ends mid-record.
pub fn decode_records(stream: &[u8]) -> Result<Vec<RecordEvent>, RecordError> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        if stream.len() - offset < 2 {
            return Err(RecordError::Truncated {
                expected: 2,
                available: stream.len() - offset,
            });
        }
        let length = u16::from_be_bytes([stream[offset], stream[offset + 1]]);
        offset += 2;
        if length == OVERRUN_MARKER {
            records.push(RecordEvent::Overrun);
            continue;
        }
        let length = length as usize;
        if stream.len() - offset < length {
            return Err(RecordError::Truncated {
                expected: length,
                available: stream.len() - offset,
            });
        }
        records.push(RecordEvent::Packet(stream[offset..offset + length].to_vec()));
        offset += length;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::{RecordEvent, RecordError, decode_records};

    #[test]
    fn decodes_packets_in_order() {
        let stream = [0x00, 0x01, 0x11, 0x00, 0x03, 0x21, 0x22, 0x23];
        let records = decode_records(&stream).unwrap();
        assert_eq!(
            records,
            vec![
                RecordEvent::Packet(vec![0x11]),
                RecordEvent::Packet(vec![0x21, 0x22, 0x23]),
            ]
        );
    }

    #[test]
    fn marker_carries_no_payload() {
        let stream = [0xFF, 0xFF, 0x00, 0x01, 0x42];
        let records = decode_records(&stream).unwrap();
        assert_eq!(records[0], RecordEvent::Overrun);
        assert_eq!(records[1], RecordEvent::Packet(vec![0x42]));
    }

    #[test]
    fn empty_stream_is_no_records() {
        assert!(decode_records(&[]).unwrap().is_empty());
    }

    #[test]
    fn truncated_prefix_is_an_error() {
        let err = decode_records(&[0x00]).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Truncated {
                expected: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let err = decode_records(&[0x00, 0x04, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Truncated {
                expected: 4,
                available: 1
            }
        ));
    }
}
