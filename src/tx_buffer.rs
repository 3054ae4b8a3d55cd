//! Transmit staging queue.
//!
//! Outbound frames are staged as whole strings in task context and drained
//! one byte per TX-empty interrupt. A cursor (string index plus byte offset)
//! tracks how far the ISR has gotten; consumed strings stay in the queue
//! until [`TxByteSource::clean`] releases them, because freeing memory from
//! an ISR is not allowed on the executive.
//!
//! # Concurrency
//!
//! Not locked. The discipline is: [`TxByteSource::pop_byte`] runs only in
//! the TX ISR; [`TxByteSource::push_string`] runs only while the TX
//! interrupt is disabled; [`TxByteSource::clean`] runs only in task context
//! while no transmission is in progress. The command engine upholds this by
//! cleaning at the top of each send, when the previous frame has fully
//! drained and the TX interrupt has switched itself off.

use core::cell::UnsafeCell;

use alloc::collections::VecDeque;
use alloc::string::String;

/// Queue of outbound strings drained byte by byte from the TX ISR.
pub struct TxByteSource {
    inner: UnsafeCell<TxInner>,
}

struct TxInner {
    /// Staged strings, oldest first. Strings before `current` are fully
    /// transmitted and waiting for `clean`.
    strings: VecDeque<String>,

    /// Index of the string currently being drained. Equal to
    /// `strings.len()` when everything staged has been transmitted.
    current: usize,

    /// Byte offset into the current string. Zero whenever `current` points
    /// past the end of the queue.
    offset: usize,
}

// SAFETY: one producer side (task context with the TX interrupt disabled)
// and one consumer side (the TX ISR) are never active at the same time; the
// interrupt enable/disable edges order their accesses.
unsafe impl Sync for TxByteSource {}
unsafe impl Send for TxByteSource {}

impl TxByteSource {
    /// Create an empty source.
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(TxInner {
                strings: VecDeque::new(),
                current: 0,
                offset: 0,
            }),
        }
    }

    /// Stage a string for transmission. Task context only, TX interrupt
    /// disabled. Empty strings are dropped, they carry no bytes.
    pub fn push_string(&self, s: String) {
        if s.is_empty() {
            return;
        }
        // SAFETY: the TX ISR is not running while the interrupt is disabled.
        let inner = unsafe { &mut *self.inner.get() };
        // When the cursor sat at the end it now points at the new string.
        inner.strings.push_back(s);
    }

    /// Yield the next byte to transmit, advancing the cursor. ISR context.
    /// Returns `None` when everything staged has been sent. Never allocates.
    #[inline]
    pub fn pop_byte(&self) -> Option<u8> {
        // SAFETY: only the TX ISR mutates the cursor while the interrupt is
        // enabled; task-side access waits for the interrupt to be disabled.
        let inner = unsafe { &mut *self.inner.get() };

        let s = inner.strings.get(inner.current)?;
        let byte = s.as_bytes()[inner.offset];

        inner.offset += 1;
        if inner.offset == s.len() {
            inner.current += 1;
            inner.offset = 0;
        }
        Some(byte)
    }

    /// True when no staged bytes remain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        // SAFETY: see `pop_byte`; reading the cursor is safe on both sides
        // of the interrupt edge.
        let inner = unsafe { &*self.inner.get() };
        inner.current >= inner.strings.len()
    }

    /// Release every fully transmitted string. Task context only; must not
    /// run while the TX interrupt is draining the queue.
    pub fn clean(&self) {
        // SAFETY: task context with no transmission in progress.
        let inner = unsafe { &mut *self.inner.get() };
        inner.strings.drain(..inner.current);
        inner.current = 0;
    }
}

impl Default for TxByteSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    fn drain(tx: &TxByteSource) -> String {
        let mut out = Vec::new();
        while let Some(b) = tx.pop_byte() {
            out.push(b);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_bytes_come_out_as_pushed_concatenation() {
        let tx = TxByteSource::new();

        tx.push_string("AT+FIRST=".to_string());
        tx.push_string("PAYLOAD".to_string());
        tx.push_string("\r\n".to_string());

        assert_eq!(drain(&tx), "AT+FIRST=PAYLOAD\r\n");
        assert!(tx.is_empty());
    }

    #[test]
    fn test_pop_on_empty_returns_none() {
        let tx = TxByteSource::new();
        assert!(tx.is_empty());
        assert_eq!(tx.pop_byte(), None);
    }

    #[test]
    fn test_push_after_full_drain_resumes() {
        let tx = TxByteSource::new();

        tx.push_string("ONE".to_string());
        assert_eq!(drain(&tx), "ONE");
        assert!(tx.is_empty());

        // The cursor sat at the end; a new push must restart it.
        tx.push_string("TWO".to_string());
        assert!(!tx.is_empty());
        assert_eq!(drain(&tx), "TWO");
    }

    #[test]
    fn test_clean_releases_only_consumed_strings() {
        let tx = TxByteSource::new();

        tx.push_string("AB".to_string());
        tx.push_string("CD".to_string());

        assert_eq!(tx.pop_byte(), Some(b'A'));
        assert_eq!(tx.pop_byte(), Some(b'B'));

        // "AB" is consumed, "CD" is still pending.
        tx.clean();
        assert!(!tx.is_empty());
        assert_eq!(drain(&tx), "CD");

        tx.clean();
        assert!(tx.is_empty());
        assert_eq!(tx.pop_byte(), None);
    }

    #[test]
    fn test_empty_strings_are_dropped() {
        let tx = TxByteSource::new();

        tx.push_string(String::new());
        assert!(tx.is_empty());

        tx.push_string("X".to_string());
        tx.push_string(String::new());
        tx.push_string("Y".to_string());
        assert_eq!(drain(&tx), "XY");
    }
}
