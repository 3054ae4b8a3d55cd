//! Response classification and unsolicited dispatch.
//!
//! [`ResponseHandler`] owns everything that interprets inbound lines: it
//! classifies each line against the currently awaited command, accumulates
//! the reply payload across data lines, and runs the registered unsolicited
//! handlers. It is not thread safe on its own; the engine serialises access
//! behind its registry mutex.
//!
//! # Known limitation
//!
//! While an extended command is awaited, any line without a `+` prefix is
//! attributed to that command, so a bare notification such as `RING`
//! arriving mid-command lands in the caller's payload instead of its
//! message handler. Bare messages are matched reliably only while no
//! command is in flight.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::at_debug;
use crate::command::{AtCmd, UnsolicitedMsg};

const CME_ERROR_PREFIX: &str = "+CME ERROR";
const ECHO_PREFIX: &str = "AT";

/// What a single inbound line meant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    /// Terminal `OK`; the accumulated payload is complete.
    TerminalOk,

    /// Terminal `ERROR`.
    TerminalError,

    /// Terminal `+CME ERROR …`; the error text was appended to the payload.
    TerminalCme,

    /// A data line of the awaited reply; appended to the payload.
    AwaitedData,

    /// The `>` prompt soliciting an inline message.
    Prompt,

    /// Echo, unsolicited traffic, or noise. Nothing for the caller.
    Ignored,
}

/// Whether a handler stays registered after an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerAction {
    /// Keep the handler; it will run again on the next matching line.
    Keep,

    /// Drop the handler; later matching lines fall through to the next one.
    Remove,
}

/// Callback for unsolicited extended-command lines. Receives the payload
/// with the `+<name>:` prefix stripped. Must not block on the executive.
pub type UnsolicitedCmdCallback = Box<dyn FnMut(String) -> HandlerAction + Send>;

/// Callback for bare unsolicited messages such as `RING`. Must not block on
/// the executive.
pub type UnsolicitedMsgCallback = Box<dyn FnMut() -> HandlerAction + Send>;

struct CmdHandlerEntry {
    command: AtCmd,
    callback: UnsolicitedCmdCallback,
}

struct MsgHandlerEntry {
    message: UnsolicitedMsg,
    callback: UnsolicitedMsgCallback,
}

/// Classifier, payload accumulator and unsolicited-handler registry.
pub struct ResponseHandler {
    cmd_handlers: Vec<CmdHandlerEntry>,
    msg_handlers: Vec<MsgHandlerEntry>,
}

impl ResponseHandler {
    pub const fn new() -> Self {
        Self {
            cmd_handlers: Vec::new(),
            msg_handlers: Vec::new(),
        }
    }

    /// Interpret one inbound line.
    ///
    /// `awaited` is the command whose reply is being collected, `None` when
    /// idle. Data lines and CME error text are appended to `payload`,
    /// joined with CR-LF between segments. Unsolicited lines are dispatched
    /// to the registries before this returns.
    pub(crate) fn handle_line(
        &mut self,
        mut line: String,
        awaited: Option<AtCmd>,
        payload: &mut String,
    ) -> LineOutcome {
        let Some(awaited) = awaited else {
            self.dispatch_unsolicited(line);
            return LineOutcome::Ignored;
        };

        // The peripheral echoes the command line we just sent.
        if line.starts_with(ECHO_PREFIX) {
            return LineOutcome::Ignored;
        }

        let outcome = classify(&line, awaited);
        match outcome {
            LineOutcome::TerminalCme => {
                let text = line.split_off(CME_ERROR_PREFIX.len());
                append_joined(payload, &text);
            }
            LineOutcome::AwaitedData => {
                if line.starts_with('+') {
                    let data = line.split_off(reply_prefix_len(&line, awaited));
                    append_joined(payload, &data);
                } else {
                    append_joined(payload, &line);
                }
            }
            LineOutcome::Ignored => self.dispatch_unsolicited(line),
            _ => {}
        }
        outcome
    }

    /// Register a handler for unsolicited `+<name>: …` lines of `command`.
    /// Handlers run in registration order; the first match consumes the
    /// line.
    pub fn register_command_handler(&mut self, command: AtCmd, callback: UnsolicitedCmdCallback) {
        self.cmd_handlers.push(CmdHandlerEntry { command, callback });
    }

    /// Register a handler for a bare unsolicited message.
    pub fn register_message_handler(
        &mut self,
        message: UnsolicitedMsg,
        callback: UnsolicitedMsgCallback,
    ) {
        self.msg_handlers.push(MsgHandlerEntry { message, callback });
    }

    /// Offer a line to the registries: extended-command handlers first, in
    /// registration order, then bare-message handlers. The first match
    /// consumes the line; a handler answering [`HandlerAction::Remove`] is
    /// dropped before the next line is processed.
    fn dispatch_unsolicited(&mut self, mut line: String) {
        for i in 0..self.cmd_handlers.len() {
            let command = self.cmd_handlers[i].command;
            if matches_extended_reply(&line, command) {
                let data = line.split_off(reply_prefix_len(&line, command));
                if (self.cmd_handlers[i].callback)(data) == HandlerAction::Remove {
                    self.cmd_handlers.remove(i);
                }
                return;
            }
        }

        for i in 0..self.msg_handlers.len() {
            if line.starts_with(self.msg_handlers[i].message.name()) {
                if (self.msg_handlers[i].callback)() == HandlerAction::Remove {
                    self.msg_handlers.remove(i);
                }
                return;
            }
        }

        // Modems are chatty; traffic nobody asked for is dropped.
        at_debug!("dropped unsolicited line: {}", line);
    }
}

impl Default for ResponseHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(line: &str, awaited: AtCmd) -> LineOutcome {
    if line == "OK" {
        LineOutcome::TerminalOk
    } else if line == "ERROR" {
        LineOutcome::TerminalError
    } else if line == ">" {
        LineOutcome::Prompt
    } else if line.starts_with(CME_ERROR_PREFIX) {
        LineOutcome::TerminalCme
    } else if is_reply_to(line, awaited) {
        LineOutcome::AwaitedData
    } else {
        LineOutcome::Ignored
    }
}

/// Does `line` belong to the reply of `command`?
///
/// Replies to basic commands are not recognised; they are rare enough that
/// the driver treats everything around them as unsolicited. For extended
/// commands a line without the `+` prefix is taken as reply data (see the
/// module-level limitation note).
fn is_reply_to(line: &str, command: AtCmd) -> bool {
    if !command.is_extended() {
        return false;
    }
    if !line.starts_with('+') {
        return true;
    }
    matches_extended_reply(line, command)
}

fn matches_extended_reply(line: &str, command: AtCmd) -> bool {
    line.starts_with('+') && line[1..].starts_with(command.name())
}

/// Length of the `+<name>:` prefix in a reply line, plus a single space
/// after the colon when present. Clamped for malformed short lines.
fn reply_prefix_len(line: &str, command: AtCmd) -> usize {
    let len = 1 + command.name().len() + 1;
    if len > line.len() {
        return line.len();
    }
    if line.as_bytes().get(len) == Some(&b' ') {
        len + 1
    } else {
        len
    }
}

/// Join rule for the accumulating payload: first segment is assigned,
/// later segments are separated with CR-LF. No terminator at either end.
fn append_joined(payload: &mut String, segment: &str) {
    if !payload.is_empty() {
        payload.push_str("\r\n");
    }
    payload.push_str(segment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn feed(
        handler: &mut ResponseHandler,
        line: &str,
        awaited: Option<AtCmd>,
        payload: &mut String,
    ) -> LineOutcome {
        handler.handle_line(line.to_string(), awaited, payload)
    }

    #[test]
    fn test_single_line_reply_without_prefix() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();
        let awaited = Some(AtCmd::Third);

        assert_eq!(
            feed(&mut h, "Some single line data without prefix", awaited, &mut payload),
            LineOutcome::AwaitedData
        );
        assert_eq!(feed(&mut h, "OK", awaited, &mut payload), LineOutcome::TerminalOk);
        assert_eq!(payload, "Some single line data without prefix");
    }

    #[test]
    fn test_single_line_reply_with_prefix() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();

        assert_eq!(
            feed(&mut h, "+FIRST: Some single line data", Some(AtCmd::First), &mut payload),
            LineOutcome::AwaitedData
        );
        assert_eq!(payload, "Some single line data");
    }

    #[test]
    fn test_no_space_after_colon() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();
        let awaited = Some(AtCmd::Ninth);

        assert_eq!(feed(&mut h, "+NINTH:MAKARENA", awaited, &mut payload), LineOutcome::AwaitedData);
        assert_eq!(feed(&mut h, "OK", awaited, &mut payload), LineOutcome::TerminalOk);
        assert_eq!(payload, "MAKARENA");
    }

    #[test]
    fn test_multiline_reply_joined_with_crlf() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();
        let awaited = Some(AtCmd::Sixth);

        for line in ["+SIXTH: A", "+SIXTH: B", "+SIXTH: C"] {
            assert_eq!(feed(&mut h, line, awaited, &mut payload), LineOutcome::AwaitedData);
        }
        assert_eq!(feed(&mut h, "OK", awaited, &mut payload), LineOutcome::TerminalOk);
        assert_eq!(payload, "A\r\nB\r\nC");
    }

    #[test]
    fn test_multiline_reply_without_prefix() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();
        let awaited = Some(AtCmd::Fifth);

        for line in ["line1", "line2"] {
            assert_eq!(feed(&mut h, line, awaited, &mut payload), LineOutcome::AwaitedData);
        }
        assert_eq!(payload, "line1\r\nline2");
    }

    #[test]
    fn test_echo_is_ignored() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();
        let awaited = Some(AtCmd::Fourth);

        assert_eq!(feed(&mut h, "AT+FOURTH=MEXICO", awaited, &mut payload), LineOutcome::Ignored);
        assert_eq!(feed(&mut h, "+FOURTH: ARGENTINA", awaited, &mut payload), LineOutcome::AwaitedData);
        assert_eq!(feed(&mut h, "OK", awaited, &mut payload), LineOutcome::TerminalOk);
        assert_eq!(payload, "ARGENTINA");
    }

    #[test]
    fn test_error_terminal() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();

        assert_eq!(
            feed(&mut h, "ERROR", Some(AtCmd::First), &mut payload),
            LineOutcome::TerminalError
        );
        assert!(payload.is_empty());
    }

    #[test]
    fn test_cme_error_carries_text() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();

        assert_eq!(
            feed(&mut h, "+CME ERROR: 100", Some(AtCmd::Second), &mut payload),
            LineOutcome::TerminalCme
        );
        assert_eq!(payload, ": 100");
    }

    #[test]
    fn test_prompt_detected() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();

        assert_eq!(feed(&mut h, ">", Some(AtCmd::First), &mut payload), LineOutcome::Prompt);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_unsolicited_mid_command_goes_to_handler() {
        let mut h = ResponseHandler::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_cb = Arc::clone(&seen);

        h.register_command_handler(
            AtCmd::First,
            Box::new(move |data| {
                assert_eq!(data, "u-data");
                seen_in_cb.fetch_add(1, Ordering::Relaxed);
                HandlerAction::Remove
            }),
        );

        let mut payload = String::new();
        let awaited = Some(AtCmd::Second);

        assert_eq!(feed(&mut h, "+FIRST: u-data", awaited, &mut payload), LineOutcome::Ignored);
        assert_eq!(feed(&mut h, "+SECOND: s-data", awaited, &mut payload), LineOutcome::AwaitedData);
        assert_eq!(feed(&mut h, "OK", awaited, &mut payload), LineOutcome::TerminalOk);

        assert_eq!(payload, "s-data");
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_one_shot_handler_runs_once() {
        let mut h = ResponseHandler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_cb = Arc::clone(&calls);

        h.register_command_handler(
            AtCmd::Third,
            Box::new(move |data| {
                assert_eq!(data, "first");
                calls_in_cb.fetch_add(1, Ordering::Relaxed);
                HandlerAction::Remove
            }),
        );

        let mut payload = String::new();
        feed(&mut h, "+THIRD: first", None, &mut payload);
        feed(&mut h, "+THIRD: second", None, &mut payload);

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_keep_handler_runs_until_removed() {
        let mut h = ResponseHandler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_cb = Arc::clone(&calls);

        h.register_command_handler(
            AtCmd::Third,
            Box::new(move |_| {
                let n = calls_in_cb.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 3 {
                    HandlerAction::Remove
                } else {
                    HandlerAction::Keep
                }
            }),
        );

        let mut payload = String::new();
        for _ in 0..4 {
            feed(&mut h, "+THIRD: again", None, &mut payload);
        }
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_earliest_registered_handler_wins() {
        let mut h = ResponseHandler::new();
        let winner = Arc::new(AtomicUsize::new(0));

        let w = Arc::clone(&winner);
        h.register_command_handler(
            AtCmd::First,
            Box::new(move |_| {
                w.store(1, Ordering::Relaxed);
                HandlerAction::Keep
            }),
        );
        let w = Arc::clone(&winner);
        h.register_command_handler(
            AtCmd::First,
            Box::new(move |_| {
                w.store(2, Ordering::Relaxed);
                HandlerAction::Keep
            }),
        );

        let mut payload = String::new();
        feed(&mut h, "+FIRST: data", None, &mut payload);
        assert_eq!(winner.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_bare_message_handler() {
        let mut h = ResponseHandler::new();
        let rang = Arc::new(AtomicUsize::new(0));
        let rang_in_cb = Arc::clone(&rang);

        h.register_message_handler(
            UnsolicitedMsg::Ring,
            Box::new(move || {
                rang_in_cb.fetch_add(1, Ordering::Relaxed);
                HandlerAction::Keep
            }),
        );

        let mut payload = String::new();
        feed(&mut h, "RING", None, &mut payload);
        feed(&mut h, "RING", None, &mut payload);
        assert_eq!(rang.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unsolicited_no_space_after_colon() {
        let mut h = ResponseHandler::new();
        let got = Arc::new(std::sync::Mutex::new(String::new()));
        let got_in_cb = Arc::clone(&got);

        h.register_command_handler(
            AtCmd::Seventh,
            Box::new(move |data| {
                *got_in_cb.lock().unwrap() = data;
                HandlerAction::Remove
            }),
        );

        let mut payload = String::new();
        feed(&mut h, "+SEVENTH:NAKED PAYLOAD", None, &mut payload);
        assert_eq!(*got.lock().unwrap(), "NAKED PAYLOAD");
    }

    #[test]
    fn test_basic_awaited_treats_lines_as_unsolicited() {
        let mut h = ResponseHandler::new();
        let mut payload = String::new();
        let awaited = Some(AtCmd::Echo);

        assert_eq!(feed(&mut h, "whatever", awaited, &mut payload), LineOutcome::Ignored);
        assert!(payload.is_empty());
        assert_eq!(feed(&mut h, "OK", awaited, &mut payload), LineOutcome::TerminalOk);
    }
}
