//! Host backend for the executive wrappers.
//!
//! A `std::sync` rendition with the same surface as the FreeRTOS backend.
//! The test suite runs the whole engine against this, the way the original
//! driver was exercised on a desktop OS before touching hardware.

use core::ffi::{c_void, CStr};
use core::ops::{Deref, DerefMut};
use core::time::Duration;

use std::sync::{Condvar, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// On the host there is no bring-up phase; the "scheduler" always runs.
pub fn scheduler_running() -> bool {
    true
}

/// Microseconds since the epoch; only ever used for log timestamps.
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Mutual exclusion with a scoped guard.
pub struct Mutex<T> {
    inner: StdMutex<T>,
}

pub struct MutexGuard<'a, T>(StdMutexGuard<'a, T>);

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: StdMutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        // A panicking test thread must not wedge the rest of the suite.
        MutexGuard(self.inner.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Counting signal capped at `max`, mirroring a counting semaphore.
pub struct Signal {
    count: StdMutex<u32>,
    max: u32,
    cv: Condvar,
}

impl Signal {
    pub fn new(max: u32) -> Self {
        Self {
            count: StdMutex::new(0),
            max,
            cv: Condvar::new(),
        }
    }

    /// Increment the count unless it is already at the cap.
    pub fn raise(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        if *count < self.max {
            *count += 1;
            self.cv.notify_one();
        }
    }

    /// Wait up to `timeout` for the count to become positive, then consume
    /// one. `Duration::ZERO` polls. Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        if *count > 0 {
            *count -= 1;
            return true;
        }
        if timeout.is_zero() {
            return false;
        }

        // Clamp so the deadline arithmetic cannot overflow on huge waits.
        let timeout = timeout.min(Duration::from_secs(86_400));
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            count = guard;
            if *count > 0 {
                *count -= 1;
                return true;
            }
        }
    }
}

/// Direct-to-task notification: an unbounded count consumed all at once,
/// the shape `ulTaskNotifyTake(pdTRUE, …)` has on the executive.
pub struct TaskNotify {
    count: StdMutex<u32>,
    cv: Condvar,
}

impl TaskNotify {
    pub fn new() -> Self {
        Self {
            count: StdMutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// Bind the notification to the calling task. A no-op here; the
    /// FreeRTOS backend records the task handle for the ISR side.
    pub fn attach(&self) {}

    /// Block until at least one notification is pending, then clear and
    /// return the pending count.
    pub fn wait(&self) -> u32 {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            count = self.cv.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        core::mem::take(&mut *count)
    }

    pub fn raise(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        self.cv.notify_one();
    }

    pub fn raise_from_isr(&self) {
        self.raise();
    }
}

/// A spawned task. The entry function is expected to return once it
/// observes its owner's stop flag; `stop` then joins the thread.
pub struct Task {
    handle: Option<thread::JoinHandle<()>>,
}

impl Task {
    pub fn spawn(
        name: &'static CStr,
        entry: extern "C" fn(*mut c_void),
        arg: *mut c_void,
        _stack_size: u32,
        _priority: u32,
    ) -> Task {
        let addr = arg as usize;
        let handle = thread::Builder::new()
            .name(name.to_str().unwrap_or("task").into())
            .spawn(move || entry(addr as *mut c_void))
            .expect("task spawn failed");
        Task {
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_caps_at_max() {
        let signal = Signal::new(1);

        signal.raise();
        signal.raise();
        signal.raise();

        assert!(signal.wait(Duration::ZERO));
        assert!(!signal.wait(Duration::ZERO));
    }

    #[test]
    fn test_task_notify_accumulates() {
        let notify = TaskNotify::new();

        notify.raise();
        notify.raise();
        notify.raise();

        assert_eq!(notify.wait(), 3);
    }
}
