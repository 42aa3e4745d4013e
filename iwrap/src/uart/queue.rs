//! Fixed-capacity single-producer single-consumer byte ring
//!
//! The queue is shared between an interrupt handler and foreground code.
//! [`ByteQueue::split`] hands out exactly one [`ByteProducer`] (owns `head`)
//! and one [`ByteConsumer`] (owns `tail`); because `split` borrows the queue
//! mutably, a second producer or consumer cannot exist while the first pair
//! is alive.
//!
//! ```text
//!   tail (consumer)          head (producer)
//!     |                        |
//! [ . d d d d d d d d d d d d . . . . . ]
//! ```
//!
//! One slot is always left empty to tell a full ring from an empty one, so
//! a `ByteQueue<N>` holds at most `N - 1` bytes. A byte pushed into a full
//! ring is dropped and counted; bytes already queued are never overwritten.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Receive buffer size of the hardware UART
pub const RX_BUFFER_SIZE: usize = 128;

/// Transmit buffer size of the hardware UART
pub const TX_BUFFER_SIZE: usize = 40;

/// Byte ring storage, see the module documentation
pub struct ByteQueue<const N: usize> {
    buffer: UnsafeCell<[u8; N]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    dropped: AtomicUsize,
}

// Safety: `head` is only stored by the producer and `tail` only by the
// consumer. A slot is written by the producer before `head` is published with
// `Release` and read by the consumer only after observing `head` with
// `Acquire`, so no slot is accessed by both halves at once.
unsafe impl<const N: usize> Sync for ByteQueue<N> {}

impl<const N: usize> ByteQueue<N> {
    const CHECK: () = assert!(N >= 2, "ByteQueue needs at least two slots");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::CHECK;
        Self {
            buffer: UnsafeCell::new([0; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Maximum number of bytes the ring holds at once
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Empty the ring and zero the drop counter
    pub fn reset(&mut self) {
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = 0;
        *self.dropped.get_mut() = 0;
    }

    /// Split into the producer and consumer halves
    pub fn split(&mut self) -> (ByteProducer<'_, N>, ByteConsumer<'_, N>) {
        let queue: &Self = self;
        (ByteProducer { queue }, ByteConsumer { queue })
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }

    fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writing half of a [`ByteQueue`]
pub struct ByteProducer<'a, const N: usize> {
    queue: &'a ByteQueue<N>,
}

impl<const N: usize> ByteProducer<'_, N> {
    /// Append `byte`, or hand it back when the ring is full
    pub fn try_enqueue(&mut self, byte: u8) -> Result<(), u8> {
        let head = self.queue.head.load(Ordering::Relaxed);
        let next = (head + 1) % N;
        if next == self.queue.tail.load(Ordering::Acquire) {
            return Err(byte);
        }
        // Safety: slot `head` is outside the consumer's readable range until
        // `head` is advanced below.
        unsafe { (*self.queue.buffer.get())[head] = byte };
        self.queue.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Append `byte`, dropping it when the ring is full
    ///
    /// Returns `false` when the byte was dropped.
    pub fn enqueue(&mut self, byte: u8) -> bool {
        match self.try_enqueue(byte) {
            Ok(()) => true,
            Err(_) => {
                // Only the producer writes the counter
                let dropped = self.queue.dropped.load(Ordering::Relaxed);
                self.queue.dropped.store(dropped.wrapping_add(1), Ordering::Relaxed);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N - 1
    }

    /// Bytes dropped because the ring was full
    pub fn dropped(&self) -> usize {
        self.queue.dropped()
    }
}

/// Reading half of a [`ByteQueue`]
pub struct ByteConsumer<'a, const N: usize> {
    queue: &'a ByteQueue<N>,
}

impl<const N: usize> ByteConsumer<'_, N> {
    /// Remove the oldest byte
    pub fn dequeue(&mut self) -> Option<u8> {
        let tail = self.queue.tail.load(Ordering::Relaxed);
        if tail == self.queue.head.load(Ordering::Acquire) {
            return None;
        }
        // Safety: slot `tail` was published by the producer's `Release` store
        // of `head` and is not reused until `tail` is advanced below.
        let byte = unsafe { (*self.queue.buffer.get())[tail] };
        self.queue.tail.store((tail + 1) % N, Ordering::Release);
        Some(byte)
    }

    /// Look at the byte `offset` places after the oldest one without removing it
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset >= self.len() {
            return None;
        }
        let tail = self.queue.tail.load(Ordering::Relaxed);
        // Safety: the slot lies inside the published readable range
        Some(unsafe { (*self.queue.buffer.get())[(tail + offset) % N] })
    }

    /// Discard everything currently readable
    ///
    /// Moves `tail` up to `head`, so bytes the producer appends concurrently
    /// are either kept whole or discarded whole.
    pub fn clear(&mut self) {
        let head = self.queue.head.load(Ordering::Acquire);
        self.queue.tail.store(head, Ordering::Release);
    }

    /// Number of unread bytes
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes dropped because the ring was full
    pub fn dropped(&self) -> usize {
        self.queue.dropped()
    }
}
