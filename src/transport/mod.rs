// Copyright 2021 Locha Mesh Developers <contact@locha.io>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A uniform handle over a single full-duplex serial line.
//!
//! This is the whole cross-platform story: one trait, one value struct
//! for line parameters, and one concrete handle type per OS behind it.
//! The protocol engine (`crate::protocol`) only ever talks to the
//! trait.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use self::unix::UnixSerialPort as SerialHandle;
#[cfg(windows)]
pub use self::windows::WindowsSerialPort as SerialHandle;

/// Supported baud rates (STM8 bootloader minimum is 4800).
///
/// Modeled as an enum, not a raw `u32`, so an unsupported rate is a
/// compile-time/parse-time error rather than something silently
/// truncated by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    Baud4800,
    Baud9600,
    Baud14400,
    Baud19200,
    Baud28800,
    Baud38400,
    Baud57600,
    Baud115200,
}

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::Baud4800 => 4800,
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud14400 => 14400,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud28800 => 28800,
            BaudRate::Baud38400 => 38400,
            BaudRate::Baud57600 => 57600,
            BaudRate::Baud115200 => 115200,
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// Port line parameters and modem-control state.
///
/// Invariant: `set_attributes(a)` followed by `get_attributes()` must
/// return a record equal to `a`, within whatever subset of values the
/// OS actually supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub baud_rate: BaudRate,
    pub timeout_ms: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub rts: bool,
    pub dtr: bool,
}

impl Default for PortSettings {
    /// 8-N-1, no flow control, RTS/DTR low, 1 second read timeout.
    fn default() -> Self {
        PortSettings {
            baud_rate: BaudRate::Baud115200,
            timeout_ms: 1000,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            rts: false,
            dtr: false,
        }
    }
}

/// A single full-duplex, byte-oriented serial line.
///
/// Implementations own the OS resource exclusively: there is no
/// internal locking, and using a handle after `close` must fail with
/// [`Error::NotOpen`] rather than silently doing nothing.
pub trait SerialPort {
    /// Release OS resources. Idempotent on an already-closed handle.
    fn close(&mut self) -> Result<()>;

    /// Current line parameters, as actually applied by the OS.
    fn get_attributes(&self) -> Result<PortSettings>;

    /// Apply new line parameters atomically.
    fn set_attributes(&mut self, attrs: &PortSettings) -> Result<()>;

    /// Change only the baud rate, leaving other attributes untouched.
    fn set_baud(&mut self, baud: BaudRate) -> Result<()> {
        let mut attrs = self.get_attributes()?;
        attrs.baud_rate = baud;
        self.set_attributes(&attrs)
    }

    /// Change the total read timeout, in milliseconds. `0` means "poll,
    /// don't wait".
    fn set_timeout(&mut self, timeout_ms: u32) -> Result<()>;

    /// Current total read timeout.
    fn timeout_ms(&self) -> u32;

    /// Write `bytes`, returning the count the OS actually accepted.
    /// Callers check `count == bytes.len()`; there is no retry here.
    fn send(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes. Returns fewer only on timeout
    /// expiry; `timeout_ms() == 0` returns immediately with whatever is
    /// already buffered.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read exactly `buf.len()` bytes or fail with [`Error::Timeout`].
    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.receive(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::Timeout);
            }
            filled += n;
        }
        Ok(())
    }

    /// Discard buffered input and output data.
    fn flush(&mut self) -> Result<()>;
}

pub(crate) fn duration_from_ms(ms: u32) -> Duration {
    Duration::from_millis(u64::from(ms))
}

/// Open the named port and apply `attrs` atomically.
pub fn open(name: &str, attrs: &PortSettings) -> Result<SerialHandle> {
    SerialHandle::open(name, attrs)
}

/// Best-effort enumeration of serial ports on this system. An empty
/// result is not an error.
pub fn list_ports() -> Vec<String> {
    crate::ports::list_all()
}
