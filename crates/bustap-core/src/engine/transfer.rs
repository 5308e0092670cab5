//! Transfer/overrun engine state machine.
//!
//! Drains completed packets from the staging buffer into the output ring
//! buffer as length-prefixed records. When a record (prefix included) would
//! not fit in the remaining output space, the packet's bytes are discarded
//! from staging, a two-byte overrun marker is written in its place, and the
//! sticky overrun latch is set. Records always leave in the order their
//! lengths were queued.

use crate::queue::BoundedQueue;
use crate::{HEADER_SIZE_BYTES, OVERRUN_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TransferState {
    Idle,
    PopLength,
    Inspect,
    Transfer,
    Overrun,
    ClearOverrun,
}

#[derive(Debug)]
pub(super) struct TransferEngine {
    state: TransferState,
    /// Working packet length; counts down while bytes are moved or discarded.
    length: u16,
    /// Steps taken on the current record, used to sequence the prefix bytes.
    progress: u32,
}

impl TransferEngine {
    pub(super) fn new() -> Self {
        Self {
            state: TransferState::Idle,
            length: 0,
            progress: 0,
        }
    }

    pub(super) fn fingerprint(&self) -> (TransferState, u16, u32) {
        (self.state, self.length, self.progress)
    }

    /// Advance one step against the shared queues.
    pub(super) fn step(
        &mut self,
        lengths: &mut BoundedQueue<u16>,
        staging: &mut BoundedQueue<u8>,
        output: &mut BoundedQueue<u8>,
        overrun: &mut bool,
    ) {
        match self.state {
            TransferState::Idle => {
                if !lengths.is_empty() {
                    self.state = TransferState::PopLength;
                }
            }
            TransferState::PopLength => {
                if let Some(length) = lengths.pop() {
                    self.length = length;
                    self.progress = 0;
                    self.state = TransferState::Inspect;
                }
            }
            TransferState::Inspect => {
                let needed = self.length as usize + HEADER_SIZE_BYTES;
                if output.len() + needed > output.capacity() {
                    self.state = TransferState::Overrun;
                } else {
                    self.state = TransferState::Transfer;
                }
            }
            TransferState::Transfer => {
                // Space for the whole record was checked in Inspect, so the
                // pushes below cannot fail.
                if self.progress == 0 {
                    let _ = output.push((self.length >> 8) as u8);
                } else if self.progress == 1 {
                    let _ = output.push((self.length & 0xFF) as u8);
                } else if self.length != 0 {
                    if let Some(byte) = staging.pop() {
                        let _ = output.push(byte);
                    }
                    self.length -= 1;
                } else {
                    self.state = TransferState::Idle;
                    return;
                }
                self.progress += 1;
            }
            TransferState::Overrun => {
                *overrun = true;
                // Hold here until the marker's two bytes fit.
                if output.free() >= HEADER_SIZE_BYTES {
                    self.state = TransferState::ClearOverrun;
                }
            }
            TransferState::ClearOverrun => {
                if self.progress < 2 {
                    let _ = output.push((OVERRUN_MARKER >> 8) as u8);
                    self.progress += 1;
                } else if self.length != 0 {
                    // Drop the lost packet's bytes so the next queued length
                    // still lines up with the staging buffer.
                    staging.pop();
                    self.length -= 1;
                } else {
                    self.state = TransferState::Idle;
                }
            }
        }
    }
}
