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

//! Best-effort serial port enumeration.
//!
//! Unlike the protocol engine, listing ports is advisory only: an empty
//! result, or one that includes a node nothing is attached to, is not
//! an error condition anywhere in this crate.

#[cfg(unix)]
pub fn list_all() -> Vec<String> {
    const PATTERNS: &[&str] = &[
        "/dev/ttyS*",     // built-in serial ports
        "/dev/ttyUSB*",   // usb-serial with its own driver
        "/dev/ttyXRUSB*", // xr-usb-serial (e.g. Dell Edge 3001)
        "/dev/ttyACM*",   // usb-serial, CDC-ACM profile
        "/dev/ttyAMA*",   // ARM SoC internal UART (Raspberry Pi)
        "/dev/rfcomm*",   // Bluetooth SPP devices
        "/dev/ttyAP*",    // Advantech multi-port serial controllers
        "/dev/tty.*",     // macOS call-in devices
        "/dev/cu.*",      // macOS call-out devices
    ];

    let mut ports = Vec::new();
    for pattern in PATTERNS {
        let paths = match glob::glob(pattern) {
            Ok(paths) => paths,
            Err(_) => continue,
        };
        for path in paths.flatten() {
            ports.push(path.to_string_lossy().into_owned());
        }
    }
    ports
}

#[cfg(windows)]
pub fn list_all() -> Vec<String> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr;

    use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::winnt::{GENERIC_READ, GENERIC_WRITE};

    let mut ports = Vec::new();
    for n in 1..=255u32 {
        let name = format!("COM{}", n);
        let wide: Vec<u16> = OsStr::new(&format!(r"\\.\{}", name))
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
                0,
                ptr::null_mut(),
            )
        };
        if raw != INVALID_HANDLE_VALUE {
            unsafe {
                CloseHandle(raw);
            }
            ports.push(name);
        }
    }
    ports
}
