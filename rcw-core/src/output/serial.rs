//! Serial-port key output.
//!
//! Only the modem-control lines are used; no data is ever written to the
//! port. It is still opened 115200 8N1 so that adapters which refuse a
//! port without line settings behave.

use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use super::{KeyOutput, LineSelect};
use crate::error::KeyerError;

pub const SERIAL_BAUD_RATE: u32 = 115_200;

/// A serial device whose RTS or DTR line keys the transmitter.
pub struct SerialOutput {
    device: String,
    port: Box<dyn SerialPort>,
}

impl SerialOutput {
    /// Open `device` (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn open(device: &str) -> Result<Self, KeyerError> {
        let port = serialport::new(device, SERIAL_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()?;
        info!("serial port {device} opened at {SERIAL_BAUD_RATE} 8N1");
        Ok(Self {
            device: device.to_string(),
            port,
        })
    }
}

impl KeyOutput for SerialOutput {
    fn set_line(&mut self, line: LineSelect, level: bool) -> Result<(), KeyerError> {
        match line {
            LineSelect::Rts => self.port.write_request_to_send(level)?,
            LineSelect::Dtr => self.port.write_data_terminal_ready(level)?,
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.device
    }
}

impl std::fmt::Debug for SerialOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialOutput")
            .field("device", &self.device)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_missing_device_is_physical_io_error() {
        let err = SerialOutput::open("/dev/rcw-no-such-port").unwrap_err();
        assert!(matches!(err, KeyerError::PhysicalIo(_)));
    }
}
