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

//! Windows serial transport: `DCB`/`GetCommState`/`SetCommState`,
//! `COMMTIMEOUTS` for the total-read-timeout contract, and
//! `EscapeCommFunction` for RTS/DTR.

use std::ffi::OsStr;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, RawHandle};
use std::ptr;

use log::{debug, trace};
use winapi::shared::minwindef::{DWORD, MAXDWORD};
use winapi::um::commapi::{ClearCommError, EscapeCommFunction, GetCommState, SetCommState, SetCommTimeouts};
use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winbase::{
    CLRDTR, CLRRTS, COMMTIMEOUTS, DCB, DTR_CONTROL_DISABLE, EVENPARITY, NOPARITY, ODDPARITY,
    ONE5STOPBITS, ONESTOPBIT, RTS_CONTROL_DISABLE, SETDTR, SETRTS, TWOSTOPBITS,
};
use winapi::um::winnt::{GENERIC_READ, GENERIC_WRITE, HANDLE};

use crate::error::{Error, Result};
use crate::transport::{BaudRate, DataBits, Parity, PortSettings, SerialPort, StopBits};

pub struct WindowsSerialPort {
    handle: Option<Handle>,
    timeout_ms: u32,
    rts: bool,
    dtr: bool,
}

/// `HANDLE` is not `Send`/`Sync` by default; a serial handle owned
/// exclusively by one `WindowsSerialPort` is safe to move across
/// threads like any other owned OS resource.
struct Handle(HANDLE);
unsafe impl Send for Handle {}

impl WindowsSerialPort {
    pub fn open(name: &str, attrs: &PortSettings) -> Result<Self> {
        // `\\.\COMn` is required for COM10 and above.
        let path = format!(r"\\.\{}", name);
        let wide: Vec<u16> = OsStr::new(&path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let raw = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                // Synchronous handle: `send`/`receive` use std's blocking
                // `Read`/`Write`, which pass no `OVERLAPPED` structure.
                // `COMMTIMEOUTS` (the total-read-timeout contract this
                // transport relies on) only governs synchronous handles.
                0,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(Error::OpenFailed(std::io::Error::last_os_error()));
        }

        let mut port = WindowsSerialPort {
            handle: Some(Handle(raw)),
            timeout_ms: attrs.timeout_ms,
            rts: attrs.rts,
            dtr: attrs.dtr,
        };
        port.set_attributes(attrs).map_err(|e| match e {
            Error::Io(io) => Error::ConfigFailed(io),
            other => other,
        })?;

        debug!("opened `{}`", name);
        Ok(port)
    }

    fn handle(&self) -> Result<HANDLE> {
        self.handle.as_ref().map(|h| h.0).ok_or(Error::NotOpen)
    }

    fn get_dcb(&self) -> Result<DCB> {
        let handle = self.handle()?;
        unsafe {
            let mut dcb: DCB = mem::zeroed();
            dcb.DCBlength = mem::size_of::<DCB>() as DWORD;
            check(GetCommState(handle, &mut dcb))?;
            Ok(dcb)
        }
    }

    fn set_dcb(&self, dcb: &mut DCB) -> Result<()> {
        let handle = self.handle()?;
        unsafe { check(SetCommState(handle, dcb))? };
        Ok(())
    }

    fn apply_timeouts(&self, timeout_ms: u32) -> Result<()> {
        let handle = self.handle()?;
        let constant = (timeout_ms as DWORD).min(MAXDWORD - 1);
        let mut timeouts = COMMTIMEOUTS {
            // Total-timeout-only read semantics: a nonzero interval
            // plus zero per-byte multiplier makes `ReadFile` return as
            // soon as data arrives or `constant` ms elapse, whichever
            // comes first.
            ReadIntervalTimeout: MAXDWORD,
            ReadTotalTimeoutMultiplier: 0,
            ReadTotalTimeoutConstant: constant,
            WriteTotalTimeoutMultiplier: 0,
            WriteTotalTimeoutConstant: constant,
        };
        unsafe { check(SetCommTimeouts(handle, &mut timeouts))? };
        Ok(())
    }

    fn set_pin(&mut self, set: DWORD, clear: DWORD, level: bool) -> Result<()> {
        let handle = self.handle()?;
        let func = if level { set } else { clear };
        unsafe { check(EscapeCommFunction(handle, func))? };
        Ok(())
    }
}

impl SerialPort for WindowsSerialPort {
    fn close(&mut self) -> Result<()> {
        if let Some(Handle(raw)) = self.handle.take() {
            let ok = unsafe { CloseHandle(raw) };
            if ok == 0 {
                return Err(Error::CloseFailed(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    fn get_attributes(&self) -> Result<PortSettings> {
        let dcb = self.get_dcb()?;

        let data_bits = match dcb.ByteSize {
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let parity = match dcb.Parity {
            ODDPARITY => Parity::Odd,
            EVENPARITY => Parity::Even,
            _ => Parity::None,
        };
        let stop_bits = match dcb.StopBits {
            TWOSTOPBITS => StopBits::Two,
            ONE5STOPBITS => StopBits::OnePointFive,
            _ => StopBits::One,
        };
        let baud_rate = baud_from_dword(dcb.BaudRate).unwrap_or(BaudRate::Baud115200);

        // `DCB`'s own flow-control bits stay disabled (RTS/DTR are
        // asserted manually via `EscapeCommFunction`, not through the
        // DCB), so the line's actual pin state is whatever we last
        // commanded rather than something `GetCommState` reports back.
        Ok(PortSettings {
            baud_rate,
            timeout_ms: self.timeout_ms,
            data_bits,
            parity,
            stop_bits,
            rts: self.rts,
            dtr: self.dtr,
        })
    }

    fn set_attributes(&mut self, attrs: &PortSettings) -> Result<()> {
        let mut dcb = self.get_dcb()?;

        dcb.DCBlength = mem::size_of::<DCB>() as DWORD;
        dcb.BaudRate = attrs.baud_rate.as_u32() as DWORD;
        dcb.ByteSize = match attrs.data_bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        dcb.Parity = match attrs.parity {
            Parity::None => NOPARITY,
            Parity::Odd => ODDPARITY,
            Parity::Even => EVENPARITY,
        };
        dcb.StopBits = match attrs.stop_bits {
            StopBits::One => ONESTOPBIT,
            StopBits::OnePointFive => ONE5STOPBITS,
            StopBits::Two => TWOSTOPBITS,
        };

        set_dcb_flags(&mut dcb);

        self.set_dcb(&mut dcb)?;
        self.apply_timeouts(attrs.timeout_ms)?;

        self.set_pin(SETRTS, CLRRTS, attrs.rts)?;
        self.set_pin(SETDTR, CLRDTR, attrs.dtr)?;
        self.rts = attrs.rts;
        self.dtr = attrs.dtr;

        self.timeout_ms = attrs.timeout_ms;

        Ok(())
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<()> {
        self.apply_timeouts(timeout_ms)?;
        self.timeout_ms = timeout_ms;
        Ok(())
    }

    fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        use std::io::Write;
        let handle = self.handle()?;
        let mut file = unsafe { std::fs::File::from_raw_handle(handle as RawHandle) };
        let result = file.write(bytes).map_err(Error::from);
        mem::forget(file); // we don't own this handle, `close` does
        trace!("sent {:?} of {} bytes", result, bytes.len());
        result
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        use std::io::Read;
        let handle = self.handle()?;
        let mut file = unsafe { std::fs::File::from_raw_handle(handle as RawHandle) };
        let result = file.read(buf).map_err(Error::from);
        mem::forget(file);
        result
    }

    fn flush(&mut self) -> Result<()> {
        let handle = self.handle()?;
        let mut errors: DWORD = 0;
        unsafe { check(ClearCommError(handle, &mut errors, ptr::null_mut()))? };
        Ok(())
    }
}

impl AsRawHandle for WindowsSerialPort {
    fn as_raw_handle(&self) -> RawHandle {
        self.handle.as_ref().map(|h| h.0 as RawHandle).unwrap_or(ptr::null_mut())
    }
}

impl Drop for WindowsSerialPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn check(ret: i32) -> Result<()> {
    if ret == 0 {
        Err(std::io::Error::last_os_error().into())
    } else {
        Ok(())
    }
}

fn set_dcb_flags(dcb: &mut DCB) {
    dcb.set_fBinary(1);
    dcb.set_fParity(0);
    dcb.set_fOutxCtsFlow(0);
    dcb.set_fOutxDsrFlow(0);
    dcb.set_fDtrControl(DTR_CONTROL_DISABLE as u32);
    dcb.set_fDsrSensitivity(0);
    dcb.set_fTXContinueOnXoff(0);
    dcb.set_fOutX(0);
    dcb.set_fInX(0);
    dcb.set_fErrorChar(0);
    dcb.set_fNull(0);
    dcb.set_fRtsControl(RTS_CONTROL_DISABLE as u32);
    dcb.set_fAbortOnError(0);
}

fn baud_from_dword(baud: DWORD) -> Option<BaudRate> {
    match baud {
        4800 => Some(BaudRate::Baud4800),
        9600 => Some(BaudRate::Baud9600),
        14400 => Some(BaudRate::Baud14400),
        19200 => Some(BaudRate::Baud19200),
        28800 => Some(BaudRate::Baud28800),
        38400 => Some(BaudRate::Baud38400),
        57600 => Some(BaudRate::Baud57600),
        115200 => Some(BaudRate::Baud115200),
        _ => None,
    }
}
