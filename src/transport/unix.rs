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

//! POSIX serial transport: `termios` raw mode, `poll`-bounded total
//! read timeout, modem-control lines via `ioctl`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::mem::MaybeUninit;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::time::Instant;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::transport::{BaudRate, DataBits, Parity, PortSettings, SerialPort, StopBits};

pub struct UnixSerialPort {
    fd: Option<File>,
    timeout_ms: u32,
}

impl UnixSerialPort {
    pub fn open(name: &str, attrs: &PortSettings) -> Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(name)
            .map_err(Error::OpenFailed)?;

        let mut port = UnixSerialPort {
            fd: Some(fd),
            timeout_ms: attrs.timeout_ms,
        };
        port.set_attributes(attrs).map_err(|e| match e {
            Error::Io(io) => Error::ConfigFailed(io),
            other => other,
        })?;

        debug!("opened `{}`", name);
        Ok(port)
    }

    fn fd(&self) -> Result<i32> {
        self.fd.as_ref().map(|f| f.as_raw_fd()).ok_or(Error::NotOpen)
    }

    fn get_termios(&self) -> Result<libc::termios> {
        let fd = self.fd()?;
        unsafe {
            let mut termios: libc::termios = MaybeUninit::zeroed().assume_init();
            check(libc::tcgetattr(fd, &mut termios))?;
            Ok(termios)
        }
    }

    fn set_termios(&self, termios: &libc::termios) -> Result<()> {
        let fd = self.fd()?;
        unsafe { check(libc::tcsetattr(fd, libc::TCSANOW, termios))? };
        Ok(())
    }

    /// Wait up to `timeout_ms` (total) for at least one readable byte.
    fn poll_read(fd: i32, timeout_ms: u32) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let n = unsafe { check(libc::poll(&mut pfd, 1, timeout_ms as i32))? };
        Ok(n > 0 && (pfd.revents & libc::POLLIN) != 0)
    }

    fn set_pin(&self, bit: libc::c_int, level: bool) -> Result<()> {
        let fd = self.fd()?;
        let request = if level { libc::TIOCMBIS } else { libc::TIOCMBIC };
        unsafe { check(libc::ioctl(fd, request as _, &bit))? };
        Ok(())
    }

    fn read_pin(&self, bit: libc::c_int) -> Result<bool> {
        let fd = self.fd()?;
        let mut status: libc::c_int = 0;
        unsafe { check(libc::ioctl(fd, libc::TIOCMGET as _, &mut status))? };
        // Must be a bitwise AND: checking presence of a single modem
        // control bit with `|` always reports true.
        Ok((status & bit) != 0)
    }
}

impl SerialPort for UnixSerialPort {
    fn close(&mut self) -> Result<()> {
        if let Some(fd) = self.fd.take() {
            drop(fd);
        }
        Ok(())
    }

    fn get_attributes(&self) -> Result<PortSettings> {
        let termios = self.get_termios()?;

        let data_bits = match termios.c_cflag & libc::CSIZE {
            libc::CS7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let parity = if termios.c_cflag & libc::PARENB == 0 {
            Parity::None
        } else if termios.c_cflag & libc::PARODD != 0 {
            Parity::Odd
        } else {
            Parity::Even
        };

        // Must be `&`, not `|`: a bitwise OR against CSTOPB is always
        // non-zero and would report "2 stop bits" unconditionally.
        let stop_bits = if termios.c_cflag & libc::CSTOPB != 0 {
            StopBits::Two
        } else {
            StopBits::One
        };

        let baud_rate = speed_to_baud(unsafe { libc::cfgetospeed(&termios) })
            .unwrap_or(BaudRate::Baud115200);

        Ok(PortSettings {
            baud_rate,
            timeout_ms: self.timeout_ms,
            data_bits,
            parity,
            stop_bits,
            rts: self.read_pin(libc::TIOCM_RTS)?,
            dtr: self.read_pin(libc::TIOCM_DTR)?,
        })
    }

    fn set_attributes(&mut self, attrs: &PortSettings) -> Result<()> {
        let mut termios = self.get_termios()?;

        unsafe { libc::cfmakeraw(&mut termios) };
        // Raw mode: no canonical input, no echo, no signal generation,
        // no output post-processing, no flow control.
        termios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        termios.c_cflag &= !libc::CRTSCTS;
        termios.c_cflag |= libc::CREAD | libc::CLOCAL;

        // Always clear the character-size field before setting exactly
        // one of CS7/CS8.
        termios.c_cflag &= !libc::CSIZE;
        termios.c_cflag |= match attrs.data_bits {
            DataBits::Seven => libc::CS7,
            DataBits::Eight => libc::CS8,
        };

        termios.c_cflag &= !(libc::PARENB | libc::PARODD);
        match attrs.parity {
            Parity::None => {}
            Parity::Odd => termios.c_cflag |= libc::PARENB | libc::PARODD,
            Parity::Even => termios.c_cflag |= libc::PARENB,
        }

        match attrs.stop_bits {
            StopBits::One => termios.c_cflag &= !libc::CSTOPB,
            StopBits::OnePointFive | StopBits::Two => termios.c_cflag |= libc::CSTOPB,
        }

        let speed = baud_to_speed(attrs.baud_rate)?;
        unsafe {
            check(libc::cfsetispeed(&mut termios, speed))?;
            check(libc::cfsetospeed(&mut termios, speed))?;
        }

        // VMIN/VTIME only approximate a total timeout; `receive` layers
        // its own poll loop on top, so request non-blocking reads here.
        termios.c_cc[libc::VMIN] = 0;
        termios.c_cc[libc::VTIME] = 0;

        self.set_termios(&termios)?;

        self.set_pin(libc::TIOCM_RTS, attrs.rts)?;
        self.set_pin(libc::TIOCM_DTR, attrs.dtr)?;

        self.timeout_ms = attrs.timeout_ms;

        Ok(())
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<()> {
        self.timeout_ms = timeout_ms;
        Ok(())
    }

    fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        let fd = self.fd.as_mut().ok_or(Error::NotOpen)?;
        let n = fd.write(bytes)?;
        trace!("sent {} of {} bytes", n, bytes.len());
        Ok(n)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let raw_fd = self.fd()?;
        let deadline = if self.timeout_ms == 0 {
            None
        } else {
            Some(Instant::now() + super::duration_from_ms(self.timeout_ms))
        };

        loop {
            let remaining_ms = match deadline {
                None => 0,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(0);
                    }
                    (deadline - now).as_millis() as u32
                }
            };

            if !Self::poll_read(raw_fd, remaining_ms)? {
                return Ok(0);
            }

            let fd = self.fd.as_mut().ok_or(Error::NotOpen)?;
            match fd.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        let fd = self.fd()?;
        unsafe { check(libc::tcflush(fd, libc::TCIOFLUSH))? };
        Ok(())
    }
}

impl Drop for UnixSerialPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn check(ret: libc::c_int) -> Result<libc::c_int> {
    if ret == -1 {
        Err(std::io::Error::last_os_error().into())
    } else {
        Ok(ret)
    }
}

fn baud_to_speed(baud: BaudRate) -> Result<libc::speed_t> {
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly"))]
    let speed = match baud {
        BaudRate::Baud4800 => Some(libc::B4800),
        BaudRate::Baud9600 => Some(libc::B9600),
        BaudRate::Baud14400 => Some(libc::B14400),
        BaudRate::Baud19200 => Some(libc::B19200),
        BaudRate::Baud28800 => Some(libc::B28800),
        BaudRate::Baud38400 => Some(libc::B38400),
        BaudRate::Baud57600 => Some(libc::B57600),
        BaudRate::Baud115200 => Some(libc::B115200),
    };

    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly")))]
    let speed = match baud {
        BaudRate::Baud4800 => Some(libc::B4800),
        BaudRate::Baud9600 => Some(libc::B9600),
        BaudRate::Baud19200 => Some(libc::B19200),
        BaudRate::Baud38400 => Some(libc::B38400),
        BaudRate::Baud57600 => Some(libc::B57600),
        BaudRate::Baud115200 => Some(libc::B115200),
        // 14400/28800 aren't standard termios speeds outside BSD; the
        // spec marks them "where available" only.
        BaudRate::Baud14400 | BaudRate::Baud28800 => None,
    };

    speed.ok_or_else(|| {
        Error::ConfigFailed(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("baud rate {} is not supported on this platform", baud),
        ))
    })
}

fn speed_to_baud(speed: libc::speed_t) -> Option<BaudRate> {
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly"))]
    {
        match speed {
            libc::B4800 => Some(BaudRate::Baud4800),
            libc::B9600 => Some(BaudRate::Baud9600),
            libc::B14400 => Some(BaudRate::Baud14400),
            libc::B19200 => Some(BaudRate::Baud19200),
            libc::B28800 => Some(BaudRate::Baud28800),
            libc::B38400 => Some(BaudRate::Baud38400),
            libc::B57600 => Some(BaudRate::Baud57600),
            libc::B115200 => Some(BaudRate::Baud115200),
            _ => None,
        }
    }
    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly")))]
    {
        match speed {
            libc::B4800 => Some(BaudRate::Baud4800),
            libc::B9600 => Some(BaudRate::Baud9600),
            libc::B19200 => Some(BaudRate::Baud19200),
            libc::B38400 => Some(BaudRate::Baud38400),
            libc::B57600 => Some(BaudRate::Baud57600),
            libc::B115200 => Some(BaudRate::Baud115200),
            _ => None,
        }
    }
}
