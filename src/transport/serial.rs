//! Serial line transport backend (spec.md section 4.1.2).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use nix::sys::termios::{self, BaudRate, SetArg, Termios};
use tracing::{debug, warn};

use super::Transport;

/// A fully non-blocking, raw (8-N-1) serial line.
///
/// On `open`, the current line discipline is snapshotted so `close` can
/// restore it, then the device is configured: 8 data bits, no parity, one
/// stop bit, no canonical processing, no echo, no signal generation, no
/// output post-processing, `VMIN=0`/`VTIME=0`.
pub struct SerialTransport {
    device: PathBuf,
    baud: u32,
    file: Option<File>,
    original_termios: Option<Termios>,
}

impl SerialTransport {
    pub fn new(device: impl Into<PathBuf>, baud: u32) -> Self {
        Self {
            device: device.into(),
            baud,
            file: None,
            original_termios: None,
        }
    }

    fn baud_rate(baud: u32) -> Option<BaudRate> {
        Some(match baud {
            9600 => BaudRate::B9600,
            19200 => BaudRate::B19200,
            38400 => BaudRate::B38400,
            57600 => BaudRate::B57600,
            115200 => BaudRate::B115200,
            230400 => BaudRate::B230400,
            460800 => BaudRate::B460800,
            500000 => BaudRate::B500000,
            576000 => BaudRate::B576000,
            921600 => BaudRate::B921600,
            1000000 => BaudRate::B1000000,
            1152000 => BaudRate::B1152000,
            1500000 => BaudRate::B1500000,
            2000000 => BaudRate::B2000000,
            2500000 => BaudRate::B2500000,
            3000000 => BaudRate::B3000000,
            3500000 => BaudRate::B3500000,
            4000000 => BaudRate::B4000000,
            _ => return None,
        })
    }

    fn configure_raw_mode(file: &File, baud: BaudRate) -> nix::Result<()> {
        let mut tio = termios::tcgetattr(file)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetispeed(&mut tio, baud)?;
        termios::cfsetospeed(&mut tio, baud)?;

        // Fully non-blocking reads: return immediately with whatever is
        // already available, even if that is nothing.
        tio.control_chars[termios::SpecialCharacterIndices::VMIN as usize] = 0;
        tio.control_chars[termios::SpecialCharacterIndices::VTIME as usize] = 0;

        termios::tcsetattr(file, SetArg::TCSANOW, &tio)
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> bool {
        if self.file.is_some() {
            return true;
        }

        let Some(baud) = Self::baud_rate(self.baud) else {
            warn!("unsupported baud rate: {}", self.baud);
            return false;
        };

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(&self.device)
        {
            Ok(f) => f,
            Err(e) => {
                warn!("failed to open serial device {:?}: {e}", self.device);
                return false;
            }
        };

        let original = match termios::tcgetattr(&file) {
            Ok(t) => t,
            Err(e) => {
                warn!("failed to read termios for {:?}: {e}", self.device);
                return false;
            }
        };

        if let Err(e) = Self::configure_raw_mode(&file, baud) {
            warn!("failed to configure serial port {:?}: {e}", self.device);
            return false;
        }

        self.original_termios = Some(original);
        self.file = Some(file);
        debug!("serial transport opened {:?} at {} baud", self.device, self.baud);
        true
    }

    fn close(&mut self) {
        if let (Some(file), Some(original)) = (self.file.as_ref(), self.original_termios.take()) {
            if let Err(e) = termios::tcsetattr(file, SetArg::TCSANOW, &original) {
                warn!("failed to restore termios for {:?}: {e}", self.device);
            }
        }
        self.file = None;
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> isize {
        let Some(file) = self.file.as_mut() else {
            return -1;
        };

        match file.read(buf) {
            Ok(n) => n as isize,
            Err(e) if would_block(&e) => 0,
            Err(e) => {
                warn!("serial read error on {:?}: {e}", self.device);
                -1
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> isize {
        let Some(file) = self.file.as_mut() else {
            return -1;
        };

        match file.write(buf) {
            Ok(n) => n as isize,
            Err(e) if would_block(&e) => 0,
            Err(e) => {
                warn!("serial write error on {:?}: {e}", self.device);
                -1
            }
        }
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_baud_rate_fails_open() {
        let mut transport = SerialTransport::new("/dev/null", 12345);
        assert!(!transport.open());
    }

    #[test]
    fn missing_device_fails_open() {
        let mut transport = SerialTransport::new("/dev/definitely-not-a-real-tty", 9600);
        assert!(!transport.open());
    }

    #[test]
    fn regular_file_fails_open_not_a_tty() {
        // A real, openable path that isn't a character device: `tcgetattr`
        // fails with ENOTTY, so `open` must report failure rather than
        // silently treating the file as a serial line.
        let file = tempfile::NamedTempFile::new().expect("create temp file");
        let mut transport = SerialTransport::new(file.path(), 9600);
        assert!(!transport.open());
    }
}
