//! FreeRTOS backend for the executive wrappers, over `esp_idf_svc::sys`.

use core::cell::UnsafeCell;
use core::ffi::{c_void, CStr};
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use core::time::Duration;

use alloc::boxed::Box;

use esp_idf_svc::sys;

/// portMAX_DELAY
const MAX_DELAY: sys::TickType_t = sys::TickType_t::MAX;
/// taskSCHEDULER_RUNNING
const SCHEDULER_RUNNING: sys::BaseType_t = 2;
/// queueQUEUE_TYPE_MUTEX
const QUEUE_TYPE_MUTEX: u8 = 1;
/// queueSEND_TO_BACK
const SEND_TO_BACK: sys::BaseType_t = 0;
/// tskNO_AFFINITY
const NO_AFFINITY: sys::BaseType_t = 0x7FFF_FFFF;

pub fn scheduler_running() -> bool {
    unsafe { sys::xTaskGetSchedulerState() == SCHEDULER_RUNNING }
}

pub fn now_us() -> i64 {
    unsafe { sys::esp_timer_get_time() }
}

fn to_ticks(timeout: Duration) -> sys::TickType_t {
    let ms = timeout.as_millis().min(u128::from(u32::MAX)) as u32;
    ms.saturating_mul(sys::CONFIG_FREERTOS_HZ) / 1000
}

/// Mutual exclusion with a scoped guard.
///
/// Before the scheduler starts the semaphore is not taken: the system is
/// still single threaded, and taking a mutex there is not allowed. This is
/// what lets unsolicited handlers be registered during static bring-up.
pub struct Mutex<T> {
    cell: UnsafeCell<T>,
    sem: sys::SemaphoreHandle_t,
}

// SAFETY: the semaphore serialises all access to the cell once the
// scheduler runs; before that the system is single threaded.
unsafe impl<T: Send> Sync for Mutex<T> {}
unsafe impl<T: Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: UnsafeCell::new(value),
            // SAFETY: plain constructor call; the handle lives until Drop.
            sem: unsafe { sys::xQueueCreateMutex(QUEUE_TYPE_MUTEX) },
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        let taken = scheduler_running();
        if taken {
            // SAFETY: valid handle, infinite wait cannot fail.
            unsafe {
                sys::xQueueSemaphoreTake(self.sem, MAX_DELAY);
            }
        }
        MutexGuard { mutex: self, taken }
    }
}

impl<T> Drop for Mutex<T> {
    fn drop(&mut self) {
        // SAFETY: no guard can outlive the mutex.
        unsafe { sys::vQueueDelete(self.sem) }
    }
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    taken: bool,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: exclusive access granted by the held semaphore (or by
        // single-threaded bring-up).
        unsafe { &*self.mutex.cell.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`.
        unsafe { &mut *self.mutex.cell.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if self.taken {
            // SAFETY: the semaphore was taken by this guard.
            unsafe {
                sys::xQueueGenericSend(self.mutex.sem, ptr::null(), 0, SEND_TO_BACK);
            }
        }
    }
}

/// Counting signal capped at `max`: a counting semaphore.
pub struct Signal {
    sem: sys::SemaphoreHandle_t,
}

// SAFETY: FreeRTOS semaphores are usable from any task and from ISRs.
unsafe impl Sync for Signal {}
unsafe impl Send for Signal {}

impl Signal {
    pub fn new(max: u32) -> Self {
        Self {
            // SAFETY: plain constructor call; the handle lives until Drop.
            sem: unsafe { sys::xQueueCreateCountingSemaphore(max, 0) },
        }
    }

    /// Increment the count. Silently saturates at the cap, which is the
    /// behaviour the overwrite queue relies on.
    pub fn raise(&self) {
        // SAFETY: valid handle; a full semaphore just rejects the give.
        unsafe {
            sys::xQueueGenericSend(self.sem, ptr::null(), 0, SEND_TO_BACK);
        }
    }

    /// Wait up to `timeout` for the count to become positive, then consume
    /// one. Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        // SAFETY: valid handle.
        unsafe { sys::xQueueSemaphoreTake(self.sem, to_ticks(timeout)) == 1 }
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        // SAFETY: no waiter can outlive the owning structure.
        unsafe { sys::vQueueDelete(self.sem) }
    }
}

/// Direct-to-task notification. The RX task binds itself with `attach`;
/// the RX ISR then wakes it with `raise_from_isr`.
pub struct TaskNotify {
    task: AtomicPtr<sys::tskTaskControlBlock>,
}

impl TaskNotify {
    pub fn new() -> Self {
        Self {
            task: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Record the calling task as the notification target.
    pub fn attach(&self) {
        // SAFETY: always callable from task context.
        self.task
            .store(unsafe { sys::xTaskGetCurrentTaskHandle() }, Ordering::Release);
    }

    /// Block until at least one notification is pending, then clear and
    /// return the pending count. Must be called by the attached task.
    pub fn wait(&self) -> u32 {
        // SAFETY: operates on the calling task's own notification slot.
        unsafe { sys::ulTaskGenericNotifyTake(0, 1, MAX_DELAY) }
    }

    /// Notify from task context.
    pub fn raise(&self) {
        let task = self.task.load(Ordering::Acquire);
        if task.is_null() {
            return;
        }
        // SAFETY: the handle stays valid for the driver's lifetime.
        unsafe {
            sys::xTaskGenericNotify(
                task,
                0,
                0,
                sys::eNotifyAction_eIncrement,
                ptr::null_mut(),
            );
        }
    }

    /// Notify from ISR context. Before the RX task has attached itself the
    /// notification is dropped; nobody is listening yet.
    pub fn raise_from_isr(&self) {
        let task = self.task.load(Ordering::Acquire);
        if task.is_null() {
            return;
        }
        let mut higher_prio_woken: sys::BaseType_t = 0;
        // SAFETY: the FromISR variant is the one legal in interrupt context.
        unsafe {
            sys::vTaskGenericNotifyGiveFromISR(task, 0, &mut higher_prio_woken);
        }
        // The port performs the context switch on interrupt exit when a
        // higher priority task was woken.
        let _ = higher_prio_woken;
    }
}

struct TaskArgs {
    entry: extern "C" fn(*mut c_void),
    arg: *mut c_void,
}

unsafe extern "C" fn task_trampoline(raw: *mut c_void) {
    // SAFETY: `raw` is the Box leaked by `Task::spawn`.
    let args = unsafe { Box::from_raw(raw as *mut TaskArgs) };
    (args.entry)(args.arg);
    // A FreeRTOS task function must not return; delete ourselves once the
    // entry function is done.
    unsafe { sys::vTaskDelete(ptr::null_mut()) }
}

/// A spawned task. The entry function is expected to return once it
/// observes its owner's stop flag; the task then deletes itself.
pub struct Task {
    handle: sys::TaskHandle_t,
}

// SAFETY: the handle is only a token; all operations on it are thread safe.
unsafe impl Send for Task {}

impl Task {
    pub fn spawn(
        name: &'static CStr,
        entry: extern "C" fn(*mut c_void),
        arg: *mut c_void,
        stack_size: u32,
        priority: u32,
    ) -> Task {
        let args = Box::into_raw(Box::new(TaskArgs { entry, arg }));
        let mut handle: sys::TaskHandle_t = ptr::null_mut();
        // SAFETY: the trampoline takes ownership of `args`.
        let created = unsafe {
            sys::xTaskCreatePinnedToCore(
                Some(task_trampoline),
                name.as_ptr(),
                stack_size,
                args as *mut c_void,
                priority,
                &mut handle,
                NO_AFFINITY,
            )
        };
        assert!(created == 1, "task creation failed");
        Task { handle }
    }

    /// Release the handle. Teardown is cooperative: the entry function
    /// exits on the owner's stop flag and the task deletes itself.
    pub fn stop(self) {
        let _ = self.handle;
    }
}
