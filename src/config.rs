//! Build-time configuration for the AT driver.
//!
//! Everything here is a compile-time constant: buffer geometry and the
//! framing switches. The closed command set lives next to the table
//! machinery in [`crate::command`].

/// Capacity of the RX byte ring in bytes. Must be a power of two; sized so
/// the RX consumer task can always drain faster than the peripheral fills.
pub const RX_BUFFER_CAPACITY: usize = 256;

/// Capacity of the ring holding line-end indexes, i.e. the maximum number of
/// complete lines that can be pending at once. Must be a power of two.
pub const RX_LINE_ENDS_CAPACITY: usize = 16;

/// Bytes that complete a line on their own when they arrive at a line
/// boundary, without a CR/LF terminator. `>` is the prompt the peripheral
/// sends when it wants an inline payload. Leave the slice empty for
/// peripherals that terminate the prompt line normally.
pub const PROMPT_BYTES: &[u8] = b">";

/// Stack size of the RX consumer task, in bytes.
pub const RX_TASK_STACK_SIZE: u32 = 4096;

/// Priority of the RX consumer task.
pub const RX_TASK_PRIORITY: u32 = 1;
