//! Hardware seam for the serial peripheral.
//!
//! The engine never touches registers; it drives the byte-level UART only
//! through this trait. The firmware implements it on top of its serial
//! driver and wires the hardware interrupts to [`crate::AtEngine::on_rx_byte`]
//! and [`crate::AtEngine::on_tx_ready`]. Tests implement it with a loopback
//! double.

/// Byte-level serial hardware controlled by the engine.
///
/// All methods may be called from task context; `send_byte` and
/// `disable_tx_interrupt` are additionally called from the TX ISR, so
/// implementations must be safe in interrupt context and must not block.
pub trait AtSerialHw: Send + Sync {
    /// Enable the receive interrupt. Called once when the RX consumer task
    /// starts.
    fn enable_rx_interrupt(&self);

    /// Disable the receive interrupt.
    fn disable_rx_interrupt(&self);

    /// Enable the transmit-ready interrupt. The ISR will drain the staged
    /// frame byte by byte until the engine disables it again.
    fn enable_tx_interrupt(&self);

    /// Disable the transmit-ready interrupt. Called from the TX ISR when
    /// the staging queue runs dry.
    fn disable_tx_interrupt(&self);

    /// Put one byte on the wire.
    fn send_byte(&self, byte: u8);
}
