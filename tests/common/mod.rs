//! Shared test harness.
//!
//! [`MockSerial`] stands in for the UART the way the hardware behaves:
//! enabling the TX interrupt synchronously drains the engine's staging
//! queue byte by byte (the interrupt keeps firing as long as it is
//! enabled), and the moment the engine switches the interrupt off the
//! harness plays the next scripted reply into the RX interrupt entry
//! point. Spontaneous traffic is injected with [`MockState::inject`].

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use at_cmd_driver::{AtEngine, AtSerialHw};

struct EngineOps {
    tx_ready: Box<dyn Fn() + Send + Sync>,
    rx_byte: Box<dyn Fn(u8) + Send + Sync>,
}

pub struct MockState {
    tx_enabled: AtomicBool,
    rx_enabled: AtomicBool,
    sent: Mutex<Vec<u8>>,
    replies: Mutex<VecDeque<Vec<String>>>,
    ops: Mutex<Option<Arc<EngineOps>>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            tx_enabled: AtomicBool::new(false),
            rx_enabled: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            ops: Mutex::new(None),
        }
    }

    fn ops(&self) -> Option<Arc<EngineOps>> {
        self.ops.lock().unwrap().clone()
    }

    /// Script the reply played back when the next outbound frame has fully
    /// drained. Lines must carry their own terminators; a bare `">"` plays
    /// the prompt byte alone.
    pub fn queue_reply(&self, lines: &[&str]) {
        self.replies
            .lock()
            .unwrap()
            .push_back(lines.iter().map(|s| s.to_string()).collect());
    }

    /// Feed bytes through the RX interrupt right now, as spontaneous
    /// traffic from the peripheral.
    pub fn inject(&self, bytes: &[u8]) {
        let ops = self.ops().expect("engine not connected");
        for &byte in bytes {
            (ops.rx_byte)(byte);
        }
    }

    /// Everything written to the wire so far.
    pub fn sent(&self) -> Vec<u8> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn feed_next_reply(&self) {
        let batch = self.replies.lock().unwrap().pop_front();
        let Some(batch) = batch else { return };
        let Some(ops) = self.ops() else { return };
        for line in batch {
            for byte in line.bytes() {
                (ops.rx_byte)(byte);
            }
        }
    }
}

pub struct MockSerial {
    state: Arc<MockState>,
}

impl AtSerialHw for MockSerial {
    fn enable_rx_interrupt(&self) {
        self.state.rx_enabled.store(true, Ordering::SeqCst);
    }

    fn disable_rx_interrupt(&self) {
        self.state.rx_enabled.store(false, Ordering::SeqCst);
    }

    fn enable_tx_interrupt(&self) {
        self.state.tx_enabled.store(true, Ordering::SeqCst);
        // The interrupt keeps firing while enabled; drain synchronously.
        if let Some(ops) = self.state.ops() {
            while self.state.tx_enabled.load(Ordering::SeqCst) {
                (ops.tx_ready)();
            }
        }
    }

    fn disable_tx_interrupt(&self) {
        self.state.tx_enabled.store(false, Ordering::SeqCst);
        // Frame complete; the peripheral answers.
        self.state.feed_next_reply();
    }

    fn send_byte(&self, byte: u8) {
        self.state.sent.lock().unwrap().push(byte);
    }
}

/// Build an engine on the mock wire without starting it. Lets tests
/// exercise bring-up ordering (e.g. handler registration before `init`).
pub fn build_engine() -> (&'static AtEngine<MockSerial>, Arc<MockState>) {
    let state = Arc::new(MockState::new());
    let serial = MockSerial {
        state: Arc::clone(&state),
    };
    let engine: &'static AtEngine<MockSerial> = Box::leak(Box::new(AtEngine::new(serial)));

    *state.ops.lock().unwrap() = Some(Arc::new(EngineOps {
        tx_ready: Box::new(move || engine.on_tx_ready()),
        rx_byte: Box::new(move |byte| engine.on_rx_byte(byte)),
    }));
    (engine, state)
}

/// Start the RX consumer task and wait until it is receiving.
pub fn start(engine: &'static AtEngine<MockSerial>, state: &MockState) {
    engine.init();
    assert!(
        wait_until(|| state.rx_enabled.load(Ordering::SeqCst)),
        "RX consumer task did not start"
    );
}

/// Build an engine on the mock wire, start its RX consumer task and wait
/// until it is receiving.
pub fn start_engine() -> (&'static AtEngine<MockSerial>, Arc<MockState>) {
    let (engine, state) = build_engine();
    start(engine, &state);
    (engine, state)
}

/// Poll `condition` for up to two seconds.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// A timeout long enough that only a lost reply can hit it.
pub const LONG: Duration = Duration::from_secs(5);
