//! Serial command channel over the buffered UART.

use embassy_rp::uart::{BufferedUartRx, BufferedUartTx, Error as UartError};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_io_async::{Read, Write};
use heapless::Vec;
use procon_core::{InputError, StatusSink, TelemetryError, MAX_STATUS_LENGTH};

/// Bytes handed from the serial reader to the control loop in one message.
pub const SERIAL_CHUNK_LEN: usize = 32;

/// A chunk of raw command bytes; line assembly happens in the engine.
pub type SerialChunk = Vec<u8, SERIAL_CHUNK_LEN>;

/// Convert UART error to input error.
fn uart_error_to_input_error(e: UartError) -> InputError {
    match e {
        UartError::Framing => InputError::Framing,
        UartError::Overrun => InputError::BufferOverflow,
        _ => InputError::Io,
    }
}

/// Receive half of the command channel.
pub struct SerialReader {
    rx: BufferedUartRx,
}

impl SerialReader {
    pub fn new(rx: BufferedUartRx) -> Self {
        Self { rx }
    }

    /// Wait for whatever bytes are available, up to one chunk.
    pub async fn receive(&mut self) -> Result<SerialChunk, InputError> {
        let mut buf = [0u8; SERIAL_CHUNK_LEN];
        let n = self
            .rx
            .read(&mut buf)
            .await
            .map_err(uart_error_to_input_error)?;
        // n <= SERIAL_CHUNK_LEN
        Ok(Vec::from_slice(&buf[..n]).unwrap_or_default())
    }
}

/// Transmit half of the command channel, used for status lines.
pub struct UartStatusSink {
    tx: BufferedUartTx,
}

impl UartStatusSink {
    pub fn new(tx: BufferedUartTx) -> Self {
        Self { tx }
    }
}

impl StatusSink for UartStatusSink {
    async fn write_line(&mut self, line: &[u8]) -> Result<(), TelemetryError> {
        self.tx.write_all(line).await.map_err(|e| match e {
            UartError::Overrun => TelemetryError::BufferFull,
            _ => TelemetryError::Io,
        })
    }
}

/// One rendered status line on its way to the UART.
pub type StatusBytes = Vec<u8, MAX_STATUS_LENGTH>;

/// Depth of the channel in front of the UART transmitter.
pub const STATUS_CHANNEL_DEPTH: usize = 8;

/// Status lines handed from the control task to the status task.
pub type StatusChannel = Channel<CriticalSectionRawMutex, StatusBytes, STATUS_CHANNEL_DEPTH>;

/// [`StatusSink`] that hands lines to the status task without waiting.
///
/// Lines are refused with [`TelemetryError::BufferFull`] while the channel is
/// full, so a slow UART never holds up a tick.
pub struct StatusForwarder {
    channel: &'static StatusChannel,
}

impl StatusForwarder {
    pub fn new(channel: &'static StatusChannel) -> Self {
        Self { channel }
    }
}

impl StatusSink for StatusForwarder {
    async fn write_line(&mut self, line: &[u8]) -> Result<(), TelemetryError> {
        let bytes = Vec::from_slice(line).map_err(|_| TelemetryError::BufferFull)?;
        self.channel
            .try_send(bytes)
            .map_err(|_| TelemetryError::BufferFull)
    }
}
