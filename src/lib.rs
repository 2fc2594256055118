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

//! # STM8 UART bootloader protocol engine
//!
//! A host-side implementation of the STMicroelectronics STM8 mask-ROM
//! UART bootloader protocol: synchronise, identify, read/write/erase
//! flash, and jump to a loaded program.
//!
//! The crate owns its serial transport end to end — there is no
//! dependency on a third-party serial port crate, since the termios
//! and DCB configuration quirks are exactly the part of a flash
//! programmer most likely to be implemented subtly wrong.
//!
//! ```no_run
//! use stm8boot::transport::{self, PortSettings};
//! use stm8boot::Stm8Bootloader;
//!
//! # fn main() -> stm8boot::Result<()> {
//! let port = transport::open("/dev/ttyUSB0", &PortSettings::default())?;
//! let mut device = Stm8Bootloader::new(port);
//! device.sync()?;
//! let info = device.get_info()?;
//! println!(
//!     "flash size: {} kB, BSL v{:x}.{:x}",
//!     info.flash_size_kb,
//!     info.bsl_version >> 4,
//!     info.bsl_version & 0x0F
//! );
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod framing;
pub mod ports;
pub mod progress;
pub mod protocol;
pub mod transport;

pub use crate::error::{Error, Result};
pub use crate::progress::{LoggingProgress, NullProgress, ProgressReporter};
pub use crate::protocol::{DeviceInfo, Stm8Bootloader};
pub use crate::transport::{BaudRate, DataBits, Parity, PortSettings, SerialPort, StopBits};
