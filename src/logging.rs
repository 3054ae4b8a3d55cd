//! Non-blocking driver diagnostics.
//!
//! The RX consumer task and the send paths run under real-time constraints,
//! so they never format to a UART directly. Instead they push fixed-size
//! entries into a lock-free ring that a housekeeping task drains at leisure:
//!
//! ```text
//! engine / handler ──▶ LOG (lock-free ring) ──▶ application drain task ──▶ UART
//! ```
//!
//! A full ring drops the entry and counts the drop. The ISR entry points of
//! the driver never log at all.
//!
//! Applications drain with [`EventLog::drain`] and render entries with
//! [`format_entry`]; the `at_debug!`…`at_error!` macros are the producer
//! side.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

/// Maximum message length per entry; longer messages are truncated.
pub const MAX_MSG_LEN: usize = 96;

/// Number of entries in the global ring. Must be a power of two.
pub const LOG_CAPACITY: usize = 64;

/// Global driver log.
pub static LOG: EventLog = EventLog::new();

/// Severity of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// One diagnostic record.
#[derive(Clone, Copy)]
pub struct LogEntry {
    /// Timestamp in microseconds.
    pub timestamp_us: i64,
    /// Severity.
    pub level: LogLevel,
    /// Used length of `msg`.
    pub len: u8,
    /// Message bytes, not terminated.
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    /// Message as text.
    pub fn text(&self) -> &str {
        core::str::from_utf8(&self.msg[..self.len as usize]).unwrap_or("<invalid utf8>")
    }
}

/// Lock-free diagnostics ring: any task may push, one drain side consumes.
///
/// Pushing never blocks; when the ring is full the entry is dropped and
/// counted. Entries are reserved with a compare-exchange on the write
/// index, so concurrent producers never share a slot.
pub struct EventLog<const N: usize = LOG_CAPACITY> {
    entries: UnsafeCell<[LogEntry; N]>,
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: producers reserve distinct slots via compare-exchange on the
// write index; the single consumer only reads slots the index handoff has
// published.
unsafe impl<const N: usize> Sync for EventLog<N> {}
unsafe impl<const N: usize> Send for EventLog<N> {}

impl<const N: usize> EventLog<N> {
    const MASK: usize = N - 1;

    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "log capacity must be a power of two");

        const EMPTY: LogEntry = LogEntry {
            timestamp_us: 0,
            level: LogLevel::Info,
            len: 0,
            msg: [0; MAX_MSG_LEN],
        };
        Self {
            entries: UnsafeCell::new([EMPTY; N]),
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push an entry. Returns `false` when the ring was full and the entry
    /// was dropped. Never blocks, never allocates.
    pub fn push(&self, timestamp_us: i64, level: LogLevel, msg: &[u8]) -> bool {
        let mut write = self.write_idx.load(Ordering::Relaxed);
        loop {
            let read = self.read_idx.load(Ordering::Acquire);
            if write.wrapping_sub(read) >= N as u32 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self.write_idx.compare_exchange_weak(
                write,
                write.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => write = current,
            }
        }

        let idx = (write as usize) & Self::MASK;
        let len = msg.len().min(MAX_MSG_LEN);
        // SAFETY: the compare-exchange reserved this slot exclusively.
        unsafe {
            let entry = &mut (*self.entries.get())[idx];
            entry.timestamp_us = timestamp_us;
            entry.level = level;
            entry.len = len as u8;
            entry.msg[..len].copy_from_slice(&msg[..len]);
        }
        true
    }

    /// Take the next entry, `None` when the ring is drained.
    pub fn drain(&self) -> Option<LogEntry> {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        if read == write {
            return None;
        }

        let idx = (read as usize) & Self::MASK;
        // SAFETY: single consumer; the slot was published before write_idx.
        let entry = unsafe { (*self.entries.get())[idx] };

        self.read_idx.store(read.wrapping_add(1), Ordering::Release);
        Some(entry)
    }

    /// Number of entries waiting to be drained.
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Entries dropped because the ring was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset the dropped counter, e.g. after reporting it.
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl<const N: usize> Default for EventLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format `args` into `buf`, truncating on overflow. Returns the number of
/// bytes written.
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    use core::fmt::Write;

    struct BufWriter<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl Write for BufWriter<'_> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            let to_write = bytes.len().min(self.buf.len() - self.pos);
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
            Ok(())
        }
    }

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// Render an entry for serial output: `[timestamp] LEVEL: message\n`.
/// Returns the number of bytes written into `buf`.
pub fn format_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    let mut staging = [0u8; MAX_MSG_LEN + 32];
    let len = format_to_buffer(
        &mut staging,
        format_args!(
            "[{:10}] {}: {}\n",
            entry.timestamp_us,
            entry.level.as_str(),
            entry.text()
        ),
    );
    let len = len.min(buf.len());
    buf[..len].copy_from_slice(&staging[..len]);
    len
}

/// Push a formatted entry into the global log without blocking.
#[macro_export]
macro_rules! at_log {
    ($level:expr, $($arg:tt)*) => {{
        let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
        let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
        $crate::logging::LOG.push($crate::os::now_us(), $level, &buf[..len]);
    }};
}

#[macro_export]
macro_rules! at_error {
    ($($arg:tt)*) => {
        $crate::at_log!($crate::logging::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! at_warn {
    ($($arg:tt)*) => {
        $crate::at_log!($crate::logging::LogLevel::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! at_info {
    ($($arg:tt)*) => {
        $crate::at_log!($crate::logging::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! at_debug {
    ($($arg:tt)*) => {
        $crate::at_log!($crate::logging::LogLevel::Debug, $($arg)*)
    };
}
