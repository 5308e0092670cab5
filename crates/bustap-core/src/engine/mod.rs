//! Tick-driven capture engine.
//!
//! The [`Analyzer`] owns three bounded queues (staging, pending lengths,
//! output ring buffer) and two state machines that communicate only through
//! them: the capture front-end fills staging and queues a length per packet;
//! the transfer engine drains queued packets into the output ring buffer as
//! length-prefixed records, substituting an overrun marker when they do not
//! fit. Each [`Analyzer::tick`] advances both machines by one step.
//!
//! The consumer side is a pull interface: [`Analyzer::read_output`] pops one
//! byte per call, and a consumer that stops calling it raises the output
//! level until the transfer engine starts dropping records. Backpressure
//! therefore surfaces as overrun, never as a stalled capture path.

mod capture;
mod transfer;

use thiserror::Error;

use crate::queue::BoundedQueue;
use crate::{LENGTH_QUEUE_DEPTH, MAX_PACKET_SIZE_BYTES};

use capture::{CaptureFrontEnd, CaptureState};
use transfer::TransferEngine;

/// One tick's worth of receive handshake signals.
///
/// `valid` and `data` are meaningful only while `active` is true. The
/// receive collaborator is expected to assert `active` at least one tick
/// before the first valid byte and deassert it to mark the packet end.
///
/// # Examples
/// ```
/// use bustap_core::RxSample;
///
/// let sample = RxSample::byte(0x42);
/// assert!(sample.active && sample.valid);
/// assert_eq!(sample.data, 0x42);
/// assert!(!RxSample::inactive().active);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxSample {
    /// A receive episode is ongoing.
    pub active: bool,
    /// The current byte is valid.
    pub valid: bool,
    /// Byte value, sampled when `active && valid`.
    pub data: u8,
}

impl RxSample {
    /// No receive activity this tick.
    pub fn inactive() -> Self {
        Self {
            active: false,
            valid: false,
            data: 0,
        }
    }

    /// Episode ongoing, no byte presented this tick.
    pub fn active() -> Self {
        Self {
            active: true,
            valid: false,
            data: 0,
        }
    }

    /// Episode ongoing with one valid byte.
    pub fn byte(data: u8) -> Self {
        Self {
            active: true,
            valid: true,
            data,
        }
    }
}

/// Read-only projection of the engine state after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Capture front-end is idle between packets (not true while armed in
    /// its start state).
    pub idle: bool,
    /// Capture front-end is accumulating a packet.
    pub capturing: bool,
    /// Sticky: data has been lost since this engine was created.
    pub overrun: bool,
    /// Pulse: a byte was accepted into staging on the last tick.
    pub sampling: bool,
}

/// Configuration rejected at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Ring addressing wraps with a mask, so the depth must be a true power
    /// of two (evenness is not enough).
    #[error("mem_depth must be a power of two, got {0}")]
    MemDepthNotPowerOfTwo(usize),
}

/// Runtime violations of the engine's documented bounds.
///
/// These are configuration/usage errors, not capture conditions: overrun,
/// the one loss condition the engine models, is reported through [`Status`]
/// and the inline marker record instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A packet exceeded the staging buffer; oversized packets are a
    /// configuration violation and are rejected rather than silently
    /// overflowing storage.
    #[error("packet exceeds staging capacity of {capacity} bytes")]
    StagingOverflow { capacity: usize },
    /// More completed packets are pending than the length queue can track.
    #[error("pending-length backlog exceeds {depth} entries")]
    LengthBacklogFull { depth: usize },
}

/// The capture engine core.
///
/// # Examples
/// ```
/// use bustap_core::{Analyzer, RxSample};
///
/// let mut analyzer = Analyzer::new(64)?;
/// analyzer.set_capture_enable(true);
/// analyzer.tick(RxSample::inactive())?;
///
/// analyzer.tick(RxSample::active())?;
/// analyzer.tick(RxSample::byte(0xAA))?;
/// analyzer.tick(RxSample::inactive())?;
/// analyzer.quiesce()?;
///
/// assert_eq!(analyzer.read_output(), Some(0x00));
/// assert_eq!(analyzer.read_output(), Some(0x01));
/// assert_eq!(analyzer.read_output(), Some(0xAA));
/// assert_eq!(analyzer.read_output(), None);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Analyzer {
    staging: BoundedQueue<u8>,
    lengths: BoundedQueue<u16>,
    output: BoundedQueue<u8>,
    capture: CaptureFrontEnd,
    transfer: TransferEngine,
    capture_enable: bool,
    overrun: bool,
    sampling: bool,
}

impl Analyzer {
    /// Create an engine with an output ring buffer of `mem_depth` bytes.
    ///
    /// # Errors
    /// Returns [`ConfigError::MemDepthNotPowerOfTwo`] unless `mem_depth` is
    /// a power of two.
    pub fn new(mem_depth: usize) -> Result<Self, ConfigError> {
        if !mem_depth.is_power_of_two() {
            return Err(ConfigError::MemDepthNotPowerOfTwo(mem_depth));
        }
        Ok(Self {
            staging: BoundedQueue::new(MAX_PACKET_SIZE_BYTES),
            lengths: BoundedQueue::new(LENGTH_QUEUE_DEPTH),
            output: BoundedQueue::new(mem_depth),
            capture: CaptureFrontEnd::new(),
            transfer: TransferEngine::new(),
            capture_enable: false,
            overrun: false,
            sampling: false,
        })
    }

    /// Gate new capture sessions on or off. Takes effect only at packet
    /// boundaries; a packet already being captured always completes.
    pub fn set_capture_enable(&mut self, enable: bool) {
        self.capture_enable = enable;
    }

    /// Advance both state machines by one step.
    ///
    /// # Errors
    /// Propagates [`EngineError`] when a documented bound is violated; the
    /// overrun condition itself never surfaces here.
    pub fn tick(&mut self, rx: RxSample) -> Result<(), EngineError> {
        self.sampling = self.capture.step(
            rx,
            self.capture_enable,
            &mut self.staging,
            &mut self.lengths,
        )?;
        self.transfer.step(
            &mut self.lengths,
            &mut self.staging,
            &mut self.output,
            &mut self.overrun,
        );
        Ok(())
    }

    /// Tick with an inactive receive channel until no further progress is
    /// possible: every queued packet has been transferred or, when the
    /// output lacks marker space, the engine is parked waiting on the
    /// consumer.
    pub fn quiesce(&mut self) -> Result<(), EngineError> {
        loop {
            let before = self.fingerprint();
            self.tick(RxSample::inactive())?;
            if self.fingerprint() == before {
                return Ok(());
            }
        }
    }

    /// Consumer pull: pop the next output byte, `None` when the stream has
    /// nothing pending.
    pub fn read_output(&mut self) -> Option<u8> {
        self.output.pop()
    }

    /// Next output byte without consuming it.
    pub fn peek_output(&self) -> Option<u8> {
        self.output.peek()
    }

    /// Current output ring buffer fill level in bytes.
    pub fn output_level(&self) -> usize {
        self.output.len()
    }

    /// Status projection for the most recent tick.
    pub fn status(&self) -> Status {
        Status {
            idle: self.capture.state() == CaptureState::Idle,
            capturing: self.capture.state() == CaptureState::Capture,
            overrun: self.overrun,
            sampling: self.sampling,
        }
    }

    fn fingerprint(&self) -> (CaptureState, (transfer::TransferState, u16, u32), usize, usize, usize) {
        (
            self.capture.state(),
            self.transfer.fingerprint(),
            self.staging.len(),
            self.lengths.len(),
            self.output.len(),
        )
    }
}
