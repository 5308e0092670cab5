//! Capture front-end state machine.
//!
//! Watches the receive handshake and turns each receive-active episode into
//! one staged packet: bytes go into the staging buffer as they arrive, and
//! the final byte count is queued for the transfer engine when the episode
//! ends. The machine never begins mid-packet and never truncates a packet
//! that has started, regardless of the capture-enable gate.

use crate::queue::BoundedQueue;

use super::{EngineError, RxSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CaptureState {
    /// Armed but not yet aligned to a packet boundary.
    Start,
    /// Waiting for the receive channel to go active.
    Idle,
    /// Accumulating bytes of the in-flight packet.
    Capture,
}

#[derive(Debug)]
pub(super) struct CaptureFrontEnd {
    state: CaptureState,
    session_len: u16,
}

impl CaptureFrontEnd {
    pub(super) fn new() -> Self {
        Self {
            state: CaptureState::Start,
            session_len: 0,
        }
    }

    pub(super) fn state(&self) -> CaptureState {
        self.state
    }

    /// Advance one step. Returns true when a byte was accepted into staging
    /// on this step (the `sampling` pulse).
    pub(super) fn step(
        &mut self,
        rx: RxSample,
        capture_enable: bool,
        staging: &mut BoundedQueue<u8>,
        lengths: &mut BoundedQueue<u16>,
    ) -> Result<bool, EngineError> {
        match self.state {
            CaptureState::Start => {
                // Wait for a packet boundary so enabling capture mid-packet
                // never produces a partial record.
                if !rx.active && capture_enable {
                    self.state = CaptureState::Idle;
                }
                Ok(false)
            }
            CaptureState::Idle => {
                if !capture_enable {
                    self.state = CaptureState::Start;
                } else if rx.active {
                    self.session_len = 0;
                    self.state = CaptureState::Capture;
                }
                Ok(false)
            }
            CaptureState::Capture => {
                if rx.active {
                    if rx.valid {
                        staging
                            .push(rx.data)
                            .map_err(|_| EngineError::StagingOverflow {
                                capacity: staging.capacity(),
                            })?;
                        self.session_len += 1;
                        return Ok(true);
                    }
                    Ok(false)
                } else {
                    // Episode over: hand the byte count to the transfer
                    // engine. Zero is a legitimate length.
                    lengths
                        .push(self.session_len)
                        .map_err(|_| EngineError::LengthBacklogFull {
                            depth: lengths.capacity(),
                        })?;
                    self.state = CaptureState::Idle;
                    Ok(false)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CaptureFrontEnd, CaptureState};
    use crate::engine::{EngineError, RxSample};
    use crate::queue::BoundedQueue;

    fn buffers() -> (BoundedQueue<u8>, BoundedQueue<u16>) {
        (BoundedQueue::new(16), BoundedQueue::new(4))
    }

    #[test]
    fn waits_for_boundary_before_arming() {
        let (mut staging, mut lengths) = buffers();
        let mut fsm = CaptureFrontEnd::new();

        // Enable asserted mid-packet: stay in START until the channel idles.
        fsm.step(RxSample::byte(0x55), true, &mut staging, &mut lengths)
            .unwrap();
        assert_eq!(fsm.state(), CaptureState::Start);
        fsm.step(RxSample::inactive(), true, &mut staging, &mut lengths)
            .unwrap();
        assert_eq!(fsm.state(), CaptureState::Idle);
        assert!(staging.is_empty());
    }

    #[test]
    fn captures_bytes_and_queues_length() {
        let (mut staging, mut lengths) = buffers();
        let mut fsm = CaptureFrontEnd::new();
        fsm.step(RxSample::inactive(), true, &mut staging, &mut lengths)
            .unwrap();

        fsm.step(RxSample::active(), true, &mut staging, &mut lengths)
            .unwrap();
        assert_eq!(fsm.state(), CaptureState::Capture);
        let sampled = fsm
            .step(RxSample::byte(0xAA), true, &mut staging, &mut lengths)
            .unwrap();
        assert!(sampled);
        fsm.step(RxSample::byte(0xBB), true, &mut staging, &mut lengths)
            .unwrap();
        fsm.step(RxSample::inactive(), true, &mut staging, &mut lengths)
            .unwrap();

        assert_eq!(fsm.state(), CaptureState::Idle);
        assert_eq!(lengths.pop(), Some(2));
        assert_eq!(staging.pop(), Some(0xAA));
        assert_eq!(staging.pop(), Some(0xBB));
    }

    #[test]
    fn zero_byte_episode_queues_length_zero() {
        let (mut staging, mut lengths) = buffers();
        let mut fsm = CaptureFrontEnd::new();
        fsm.step(RxSample::inactive(), true, &mut staging, &mut lengths)
            .unwrap();

        fsm.step(RxSample::active(), true, &mut staging, &mut lengths)
            .unwrap();
        fsm.step(RxSample::inactive(), true, &mut staging, &mut lengths)
            .unwrap();
        assert_eq!(lengths.pop(), Some(0));
        assert!(staging.is_empty());
    }

    #[test]
    fn disable_mid_packet_does_not_truncate() {
        let (mut staging, mut lengths) = buffers();
        let mut fsm = CaptureFrontEnd::new();
        fsm.step(RxSample::inactive(), true, &mut staging, &mut lengths)
            .unwrap();
        fsm.step(RxSample::active(), true, &mut staging, &mut lengths)
            .unwrap();
        fsm.step(RxSample::byte(0x01), true, &mut staging, &mut lengths)
            .unwrap();

        // Disable takes effect only between packets.
        fsm.step(RxSample::byte(0x02), false, &mut staging, &mut lengths)
            .unwrap();
        assert_eq!(fsm.state(), CaptureState::Capture);
        fsm.step(RxSample::inactive(), false, &mut staging, &mut lengths)
            .unwrap();
        assert_eq!(lengths.pop(), Some(2));

        // Back at the boundary, the gate is honored.
        fsm.step(RxSample::inactive(), false, &mut staging, &mut lengths)
            .unwrap();
        assert_eq!(fsm.state(), CaptureState::Start);
    }

    #[test]
    fn staging_overflow_is_an_error() {
        let mut staging = BoundedQueue::new(2);
        let mut lengths = BoundedQueue::new(4);
        let mut fsm = CaptureFrontEnd::new();
        fsm.step(RxSample::inactive(), true, &mut staging, &mut lengths)
            .unwrap();
        fsm.step(RxSample::active(), true, &mut staging, &mut lengths)
            .unwrap();
        fsm.step(RxSample::byte(0x01), true, &mut staging, &mut lengths)
            .unwrap();
        fsm.step(RxSample::byte(0x02), true, &mut staging, &mut lengths)
            .unwrap();
        let err = fsm
            .step(RxSample::byte(0x03), true, &mut staging, &mut lengths)
            .unwrap_err();
        assert!(matches!(err, EngineError::StagingOverflow { capacity: 2 }));
    }
}
