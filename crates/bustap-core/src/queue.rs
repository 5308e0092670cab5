//! Fixed-capacity FIFO queue used for all three engine buffers.
//!
//! One generic circular buffer backs the output ring buffer (bytes), the
//! packet staging buffer (bytes), and the pending-lengths queue (u16). The
//! fill level is tracked explicitly so callers can make admission decisions
//! (the transfer engine's space check) without popping anything.
//!
//! # Invariants
//! - `len <= capacity` at all times.
//! - `push` on a full queue is rejected and returns the value.
//! - FIFO order is exact: no reordering, no duplication.

/// Bounded FIFO over `Copy` elements with an explicit fill level.
///
/// # Examples
/// ```
/// use bustap_core::BoundedQueue;
///
/// let mut queue = BoundedQueue::new(4);
/// queue.push(1u8).unwrap();
/// queue.push(2u8).unwrap();
/// assert_eq!(queue.len(), 2);
/// assert_eq!(queue.pop(), Some(1));
/// assert_eq!(queue.pop(), Some(2));
/// assert_eq!(queue.pop(), None);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    buf: Vec<T>,
    head: usize,
    len: usize,
}

impl<T: Copy + Default> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` elements.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of elements the queue can hold.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Current fill level.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the fill level is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the fill level equals the capacity.
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Free space remaining.
    pub fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Append `value` at the tail, or hand it back when the queue is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let tail = (self.head + self.len) % self.buf.len();
        self.buf[tail] = value;
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest element, or `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.buf[self.head];
        self.head = (self.head + 1) % self.buf.len();
        self.len -= 1;
        Some(value)
    }

    /// Oldest element without removing it.
    pub fn peek(&self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.buf[self.head])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BoundedQueue;

    #[test]
    fn preserves_fifo_order() {
        let mut queue = BoundedQueue::new(8);
        for value in 0u8..5 {
            queue.push(value).unwrap();
        }
        for value in 0u8..5 {
            assert_eq!(queue.pop(), Some(value));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn rejects_push_when_full() {
        let mut queue = BoundedQueue::new(2);
        queue.push(10u16).unwrap();
        queue.push(11u16).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.push(12u16), Err(12));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let mut queue: BoundedQueue<u8> = BoundedQueue::new(1);
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.peek(), None);
    }

    #[test]
    fn wraps_around_storage_boundary() {
        let mut queue = BoundedQueue::new(3);
        queue.push(1u8).unwrap();
        queue.push(2u8).unwrap();
        assert_eq!(queue.pop(), Some(1));
        queue.push(3u8).unwrap();
        queue.push(4u8).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
    }

    #[test]
    fn level_tracks_pushes_and_pops() {
        let mut queue = BoundedQueue::new(4);
        assert_eq!(queue.free(), 4);
        queue.push(0u8).unwrap();
        queue.push(0u8).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.free(), 2);
        queue.pop();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.free(), 3);
    }
}
