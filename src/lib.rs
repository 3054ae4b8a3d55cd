//! # AT command driver
//!
//! Protocol engine for modem-like peripherals driven over a byte-oriented
//! serial link with Hayes-style `AT` commands, built for a FreeRTOS-based
//! target (ESP-IDF).
//!
//! ## Architecture
//!
//! Three contexts touch the driver and each owns its own end of the data
//! structures:
//! - the **serial ISRs** push received bytes into the line framer and pull
//!   transmit bytes out of the staging queue; they never allocate, never
//!   take a mutex and never run user callbacks,
//! - a dedicated **RX consumer task** turns complete lines into classified
//!   responses, accumulates reply payloads and dispatches unsolicited
//!   traffic,
//! - **caller tasks** send commands one at a time and block on a one-slot
//!   result queue with a timeout.
//!
//! The framer and the staging queue are lock-free by discipline (single
//! producer, single consumer, separated by interrupt enable/disable edges);
//! the handler registry is the only mutex-guarded shared state.
//!
//! See [`AtEngine`] for the entry points and [`config`] for the build-time
//! knobs.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(not(target_os = "espidf"))]
extern crate std;

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod hal;
pub mod handler;
pub mod logging;
pub mod os;
pub mod rx_buffer;
pub mod tx_buffer;

pub use command::{AtCmd, AtCmdType, UnsolicitedMsg};
pub use engine::{AtEngine, PromptEnd};
pub use error::AtError;
pub use hal::AtSerialHw;
pub use handler::HandlerAction;
