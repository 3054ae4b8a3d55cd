//! Executive wrappers.
//!
//! Everything the driver needs from the real-time executive lives behind
//! this module: a mutex with a scoped guard, a counting signal, a one-slot
//! overwrite queue, direct-to-task notifications and task spawning.
//!
//! Two backends provide the same surface:
//! - on `target_os = "espidf"` the wrappers sit directly on the FreeRTOS
//!   primitives exposed by `esp_idf_svc::sys`;
//! - everywhere else a `std::sync` implementation stands in, which is what
//!   the host test suite runs against.
//!
//! The mutex is scheduler-aware: before the scheduler starts the system is
//! single threaded and no semaphore exists to take, so `lock` degrades to a
//! plain access. That is what allows unsolicited handlers to be registered
//! during static bring-up.

#[cfg(target_os = "espidf")]
mod freertos;
#[cfg(target_os = "espidf")]
pub use freertos::{now_us, scheduler_running, Mutex, MutexGuard, Signal, Task, TaskNotify};

#[cfg(not(target_os = "espidf"))]
mod host;
#[cfg(not(target_os = "espidf"))]
pub use host::{now_us, scheduler_running, Mutex, MutexGuard, Signal, Task, TaskNotify};

mod queue;
pub use queue::OverwriteQueue;
