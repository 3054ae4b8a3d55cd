//! The command engine.
//!
//! [`AtEngine`] owns the whole protocol state between the application tasks
//! and the serial ISRs:
//!
//! ```text
//! caller task ── send ──▶ TX staging ──▶ TX ISR ──▶ wire
//!      ▲                                              │
//!      │ result queue                                 ▼
//! RX consumer task ◀── notify ◀── RX framer ◀── RX ISR
//! ```
//!
//! One command is in flight at a time; callers serialise on the send mutex
//! and block on the one-slot result queue. A dedicated RX consumer task
//! drains the line framer, classifies every line against the awaited
//! command and publishes the terminal result. Unsolicited traffic keeps
//! flowing between commands; the dispatcher runs on the RX task.
//!
//! A command that times out leaves nothing wedged: the next `send` replaces
//! the awaited-command slot, and a late result is discarded by the command
//! identifier check on the result queue.

use core::ffi::c_void;
use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use alloc::string::{String, ToString};

use crate::at_warn;
use crate::command::{format_prefix, AtCmd, AtCmdType, UnsolicitedMsg};
use crate::config;
use crate::error::AtError;
use crate::hal::AtSerialHw;
use crate::handler::{
    HandlerAction, LineOutcome, ResponseHandler, UnsolicitedCmdCallback, UnsolicitedMsgCallback,
};
use crate::os::{Mutex, OverwriteQueue, Task, TaskNotify};
use crate::rx_buffer::RxLineBuffer;
use crate::tx_buffer::TxByteSource;

const CTRL_Z: &str = "\x1A";

/// How the reply to a `>` prompt is terminated on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptEnd {
    /// CTRL-Z then CR-LF; the usual SMS-style body terminator.
    CtrlZ,

    /// CR-LF alone.
    CrLf,
}

struct PromptMessage {
    message: String,
    end: PromptEnd,
}

/// How a command run terminated. Only terminal classifications are ever
/// published to the result queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResponseStatus {
    Ok,
    Error,
    CmeError,
}

struct WorkResult {
    command: AtCmd,
    status: ResponseStatus,
    payload: String,
}

/// AT protocol engine. One instance owns the serial link.
///
/// The engine must be given a `'static` home (the firmware keeps it in a
/// once-initialised static; tests leak a box) because the RX consumer task
/// and the ISRs reference it for the driver's whole lifetime.
pub struct AtEngine<H: AtSerialHw> {
    hw: H,

    /// ISR → RX task. Push side lives in `on_rx_byte`.
    rx_buf: RxLineBuffer<{ config::RX_BUFFER_CAPACITY }>,

    /// Task → ISR. Pushed under the send mutex with the TX interrupt
    /// disabled; drained by `on_tx_ready`.
    tx_buf: TxByteSource,

    /// Classifier state and unsolicited registries, shared between
    /// registering callers and the RX consumer task.
    handler: Mutex<ResponseHandler>,

    /// Serialises senders: at most one command in flight.
    send_mutex: Mutex<()>,

    /// Hand-off of the awaited command to the RX consumer task.
    work_queue: OverwriteQueue<AtCmd>,

    /// Terminal results back to the blocked sender.
    result_queue: OverwriteQueue<WorkResult>,

    /// Single-slot store for the pending prompt reply.
    prompt: Mutex<Option<PromptMessage>>,

    /// Wakes the RX consumer task when the framer completes lines.
    rx_notify: TaskNotify,

    running: AtomicBool,
    rx_task: Mutex<Option<Task>>,
}

impl<H: AtSerialHw + 'static> AtEngine<H> {
    pub fn new(hw: H) -> Self {
        Self {
            hw,
            rx_buf: RxLineBuffer::new(config::PROMPT_BYTES),
            tx_buf: TxByteSource::new(),
            handler: Mutex::new(ResponseHandler::new()),
            send_mutex: Mutex::new(()),
            work_queue: OverwriteQueue::new(),
            result_queue: OverwriteQueue::new(),
            prompt: Mutex::new(None),
            rx_notify: TaskNotify::new(),
            running: AtomicBool::new(false),
            rx_task: Mutex::new(None),
        }
    }

    /// Spawn the RX consumer task and start receiving. Call once after the
    /// engine has reached its `'static` home.
    pub fn init(&'static self) {
        self.running.store(true, Ordering::Release);
        let task = Task::spawn(
            c"at_rx",
            rx_task_entry::<H>,
            self as *const Self as *mut c_void,
            config::RX_TASK_STACK_SIZE,
            config::RX_TASK_PRIORITY,
        );
        *self.rx_task.lock() = Some(task);
    }

    /// Stop the RX consumer task. Pending lines are abandoned.
    pub fn deinit(&self) {
        self.running.store(false, Ordering::Release);
        self.rx_notify.raise();
        if let Some(task) = self.rx_task.lock().take() {
            task.stop();
        }
    }

    /// Send an `EXEC`, `READ` or `TEST` command and collect the reply
    /// payload. Blocks up to `timeout` for the terminal line; other
    /// senders queue up behind the in-flight command without a bound.
    pub fn send(
        &self,
        command: AtCmd,
        command_type: AtCmdType,
        timeout: Duration,
    ) -> Result<String, AtError> {
        let prefix = format_prefix(command, command_type);
        self.send_frame(command, prefix, None, timeout)
    }

    /// Send a `WRITE` command carrying `payload` after the `=`.
    pub fn send_write(
        &self,
        command: AtCmd,
        payload: impl Into<String>,
        timeout: Duration,
    ) -> Result<String, AtError> {
        let prefix = format_prefix(command, AtCmdType::Write);
        self.send_frame(command, prefix, Some(payload.into()), timeout)
    }

    /// Send a `WRITE` command whose peripheral answers with a `>` prompt;
    /// `prompt_message` is then emitted, terminated per `end`. The stored
    /// message is recorded before the primary frame goes out.
    pub fn send_prompted(
        &self,
        command: AtCmd,
        payload: impl Into<String>,
        prompt_message: impl Into<String>,
        end: PromptEnd,
        timeout: Duration,
    ) -> Result<(), AtError> {
        let prefix = format_prefix(command, AtCmdType::Write);
        *self.prompt.lock() = Some(PromptMessage {
            message: prompt_message.into(),
            end,
        });
        self.send_frame(command, prefix, Some(payload.into()), timeout)
            .map(|_| ())
    }

    /// Register a handler for unsolicited `+<name>: …` lines of `command`.
    ///
    /// Registration works before the scheduler is running, so handlers can
    /// be installed during static bring-up. Handlers run on the RX consumer
    /// task and must not block on the executive.
    pub fn register_unsolicited(
        &self,
        command: AtCmd,
        handler: impl FnMut(String) -> HandlerAction + Send + 'static,
    ) {
        let callback: UnsolicitedCmdCallback = alloc::boxed::Box::new(handler);
        self.handler.lock().register_command_handler(command, callback);
    }

    /// Register a handler for a bare unsolicited message such as `RING`.
    pub fn register_unsolicited_msg(
        &self,
        message: UnsolicitedMsg,
        handler: impl FnMut() -> HandlerAction + Send + 'static,
    ) {
        let callback: UnsolicitedMsgCallback = alloc::boxed::Box::new(handler);
        self.handler.lock().register_message_handler(message, callback);
    }

    /// RX byte interrupt entry point. Never blocks, never allocates.
    #[inline]
    pub fn on_rx_byte(&self, byte: u8) {
        if self.rx_buf.push_byte(byte) {
            self.rx_notify.raise_from_isr();
        }
    }

    /// TX ready interrupt entry point: feed the next byte to the wire or
    /// switch the interrupt off when the frame is fully drained.
    #[inline]
    pub fn on_tx_ready(&self) {
        match self.tx_buf.pop_byte() {
            Some(byte) => self.hw.send_byte(byte),
            None => self.hw.disable_tx_interrupt(),
        }
    }

    fn send_frame(
        &self,
        command: AtCmd,
        prefix: String,
        payload: Option<String>,
        timeout: Duration,
    ) -> Result<String, AtError> {
        // One command in flight; everyone else waits here.
        let _guard = self.send_mutex.lock();

        self.work_queue.overwrite(command);

        // The previous frame has fully drained and the TX interrupt has
        // switched itself off, so the consumed strings can be released.
        self.tx_buf.clean();

        match payload {
            Some(payload) => {
                self.tx_buf.push_string(prefix);
                self.tx_buf.push_string(payload);
                self.tx_buf.push_string("\r\n".to_string());
            }
            None => {
                let mut frame = prefix;
                frame.push_str("\r\n");
                self.tx_buf.push_string(frame);
            }
        }
        self.hw.enable_tx_interrupt();

        loop {
            let Some(result) = self.result_queue.receive(timeout) else {
                return Err(AtError::Timeout);
            };
            if result.command != command {
                // Late result of a command that already timed out; wait for
                // the real one.
                at_warn!("discarding stale result for {:?}", result.command);
                continue;
            }
            return match result.status {
                ResponseStatus::Ok => Ok(result.payload),
                ResponseStatus::Error => Err(AtError::Error),
                ResponseStatus::CmeError => Err(AtError::Cme(result.payload)),
            };
        }
    }

    /// Body of the RX consumer task: the only consumer of the framer and
    /// the only writer of the awaited slot and the payload accumulator.
    fn rx_task(&self) {
        self.rx_notify.attach();
        self.hw.enable_rx_interrupt();

        let mut awaited: Option<AtCmd> = None;
        let mut payload = String::new();

        while self.running.load(Ordering::Acquire) {
            let mut pending = self.rx_notify.wait();
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            while pending > 0 {
                pending -= 1;
                let Some(line) = self.rx_buf.pop_line() else {
                    continue;
                };
                self.handle_received_line(line, &mut awaited, &mut payload);
            }
        }
    }

    fn handle_received_line(
        &self,
        line: String,
        awaited: &mut Option<AtCmd>,
        payload: &mut String,
    ) {
        // A sender may have deputed a new command since the last line; the
        // accumulator of an unfinished previous command is stale then.
        if let Some(command) = self.work_queue.receive(Duration::ZERO) {
            payload.clear();
            *awaited = Some(command);
        }

        let outcome = self.handler.lock().handle_line(line, *awaited, payload);

        match outcome {
            LineOutcome::TerminalOk => self.publish(awaited, payload, ResponseStatus::Ok),
            LineOutcome::TerminalError => self.publish(awaited, payload, ResponseStatus::Error),
            LineOutcome::TerminalCme => self.publish(awaited, payload, ResponseStatus::CmeError),
            LineOutcome::Prompt => self.transmit_prompt_reply(),
            LineOutcome::AwaitedData | LineOutcome::Ignored => {}
        }
    }

    fn publish(&self, awaited: &mut Option<AtCmd>, payload: &mut String, status: ResponseStatus) {
        let Some(command) = awaited.take() else {
            return;
        };
        self.result_queue.overwrite(WorkResult {
            command,
            status,
            payload: mem::take(payload),
        });
    }

    /// Emit the stored prompt message. Runs on the RX consumer task; the
    /// primary frame has drained by the time the peripheral prompts, so
    /// the TX interrupt is idle and staging is safe.
    fn transmit_prompt_reply(&self) {
        let Some(PromptMessage { message, end }) = self.prompt.lock().take() else {
            // A prompt nobody asked for; dropping it beats replying with
            // garbage.
            at_warn!("prompt received with no stored message");
            return;
        };

        let terminator = match end {
            PromptEnd::CtrlZ => {
                let mut t = String::with_capacity(3);
                t.push_str(CTRL_Z);
                t.push_str("\r\n");
                t
            }
            PromptEnd::CrLf => "\r\n".to_string(),
        };

        self.tx_buf.push_string(message);
        self.tx_buf.push_string(terminator);
        self.hw.enable_tx_interrupt();
    }
}

extern "C" fn rx_task_entry<H: AtSerialHw + 'static>(arg: *mut c_void) {
    // SAFETY: `init` hands over a pointer to a 'static engine.
    let engine = unsafe { &*(arg as *const AtEngine<H>) };
    engine.rx_task();
}
