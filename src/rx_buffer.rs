//! Interrupt-fed line framer.
//!
//! Bytes go in one at a time from the RX ISR; complete lines come out in
//! task context. Two rings back this: a byte ring holding the raw payload
//! and a small ring of line-end indexes recorded whenever a terminator
//! (CR, LF or NUL) closes a non-empty line. Consecutive terminators are
//! swallowed, so zero-length lines never surface.
//!
//! A byte listed in [`crate::config::PROMPT_BYTES`] (the `>` prompt) closes
//! a line all by itself, but only when it arrives at a line boundary; mid-
//! line it is ordinary payload.
//!
//! # Concurrency
//!
//! Lock-free by discipline: exactly one producer (the RX ISR calling
//! [`RxLineBuffer::push_byte`]) and one consumer (the RX task calling
//! [`RxLineBuffer::pop_line`]). Indexes are free-running counters wrapped
//! with a power-of-two mask at access time; the producer publishes with
//! `Release`, the consumer observes with `Acquire`.
//!
//! # Overflow
//!
//! Overflow means the consumer did not keep up over a sustained interval
//! and the buffers are undersized. Debug builds assert; release builds
//! wrap and corrupt the oldest pending line.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::string::String;
use alloc::vec::Vec;

use crate::config::RX_LINE_ENDS_CAPACITY;

/// Lock-free byte-in/line-out ring for the RX path.
pub struct RxLineBuffer<const N: usize> {
    /// Raw received bytes, terminators excluded.
    bytes: UnsafeCell<[u8; N]>,

    /// Next write index into `bytes` (free-running, ISR side).
    head: AtomicUsize,

    /// Next read index into `bytes` (free-running, task side).
    tail: AtomicUsize,

    /// Ring of byte-ring indexes where completed lines end.
    line_ends: UnsafeCell<[usize; RX_LINE_ENDS_CAPACITY]>,

    /// Next write index into `line_ends` (free-running, ISR side).
    ends_head: AtomicUsize,

    /// Next read index into `line_ends` (free-running, task side).
    ends_tail: AtomicUsize,

    /// Byte-ring index of the most recently recorded line end. Equal to
    /// `head` exactly when the current line is still empty. ISR-only state.
    last_end: UnsafeCell<usize>,

    /// Bytes that complete a line on their own at a line boundary.
    solo_line_bytes: &'static [u8],
}

// SAFETY: single producer (RX ISR), single consumer (RX task). All shared
// indexes are atomics; the cell contents are only written by the producer
// and only read by the consumer behind the Release/Acquire index handoff.
unsafe impl<const N: usize> Sync for RxLineBuffer<N> {}
unsafe impl<const N: usize> Send for RxLineBuffer<N> {}

impl<const N: usize> RxLineBuffer<N> {
    const MASK: usize = N - 1;
    const ENDS_MASK: usize = RX_LINE_ENDS_CAPACITY - 1;

    /// Create an empty framer.
    ///
    /// `solo_line_bytes` lists the bytes treated as whole lines when they
    /// arrive alone (normally [`crate::config::PROMPT_BYTES`]).
    ///
    /// # Panics
    ///
    /// Panics at compile time if either ring capacity is not a power of two.
    pub const fn new(solo_line_bytes: &'static [u8]) -> Self {
        assert!(N.is_power_of_two(), "RX byte ring capacity must be a power of two");
        assert!(
            RX_LINE_ENDS_CAPACITY.is_power_of_two(),
            "RX line-end ring capacity must be a power of two"
        );

        Self {
            bytes: UnsafeCell::new([0u8; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            line_ends: UnsafeCell::new([0usize; RX_LINE_ENDS_CAPACITY]),
            ends_head: AtomicUsize::new(0),
            ends_tail: AtomicUsize::new(0),
            last_end: UnsafeCell::new(0),
            solo_line_bytes,
        }
    }

    /// Feed one received byte. Call only from the RX ISR.
    ///
    /// Returns `true` when the byte completed a line, in which case the RX
    /// consumer task should be notified. Never blocks, never allocates.
    #[inline]
    pub fn push_byte(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        // SAFETY: `last_end` is written and read only from the ISR.
        let last_end = unsafe { *self.last_end.get() };

        if byte == b'\r' || byte == b'\n' || byte == 0 {
            // A terminator right after the previous one means an empty
            // line; swallow it.
            if last_end == head {
                return false;
            }
            self.record_line_end(head);
            return true;
        }

        if self.solo_line_bytes.contains(&byte) && last_end == head {
            self.push_raw(byte, head);
            self.record_line_end(head.wrapping_add(1));
            return true;
        }

        self.push_raw(byte, head);
        false
    }

    /// Pop the earliest complete line, terminators stripped. Call only from
    /// the RX consumer task. Returns `None` when no line is pending.
    pub fn pop_line(&self) -> Option<String> {
        let ends_tail = self.ends_tail.load(Ordering::Relaxed);
        if ends_tail == self.ends_head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the Acquire load above guarantees the producer's write of
        // this slot is visible, and the producer never rewrites a slot that
        // the consumer has not released yet.
        let end = unsafe { (*self.line_ends.get())[ends_tail & Self::ENDS_MASK] };

        let tail = self.tail.load(Ordering::Relaxed);
        let len = end.wrapping_sub(tail);
        let start = tail & Self::MASK;

        let mut line = Vec::with_capacity(len);
        // SAFETY: bytes in [tail, end) were published before the line-end
        // index; the two-segment copy handles the wrap at the ring boundary.
        unsafe {
            let bytes = &*self.bytes.get();
            if start + len <= N {
                line.extend_from_slice(&bytes[start..start + len]);
            } else {
                line.extend_from_slice(&bytes[start..N]);
                line.extend_from_slice(&bytes[..len - (N - start)]);
            }
        }

        self.tail.store(end, Ordering::Release);
        self.ends_tail.store(ends_tail.wrapping_add(1), Ordering::Release);

        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// True when no complete line is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ends_tail.load(Ordering::Relaxed) == self.ends_head.load(Ordering::Acquire)
    }

    #[inline]
    fn push_raw(&self, byte: u8, head: usize) {
        debug_assert!(
            head.wrapping_sub(self.tail.load(Ordering::Relaxed)) < N,
            "RX byte ring overflow"
        );
        // SAFETY: single producer; the slot at `head` is not yet visible to
        // the consumer until the Release store below.
        unsafe {
            (*self.bytes.get())[head & Self::MASK] = byte;
        }
        self.head.store(head.wrapping_add(1), Ordering::Release);
    }

    #[inline]
    fn record_line_end(&self, end: usize) {
        let ends_head = self.ends_head.load(Ordering::Relaxed);
        debug_assert!(
            ends_head.wrapping_sub(self.ends_tail.load(Ordering::Relaxed)) < RX_LINE_ENDS_CAPACITY,
            "RX line-end ring overflow"
        );
        // SAFETY: single producer, slot published by the Release store.
        unsafe {
            (*self.line_ends.get())[ends_head & Self::ENDS_MASK] = end;
            *self.last_end.get() = end;
        }
        self.ends_head.store(ends_head.wrapping_add(1), Ordering::Release);
    }
}
