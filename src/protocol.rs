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

//! The STM8 UART ROM bootloader protocol engine.
//!
//! `Stm8Bootloader<P>` drives a [`SerialPort`] through the bootloader's
//! `sync`/`getInfo`/`memCheck`/`memRead`/`flashErase`/`memWrite`/`jumpTo`
//! state machine. Every public method is a complete transaction: any
//! unexpected byte or timeout aborts that transaction and returns the
//! engine to `Ready` with no attempt at in-flight recovery (§7 of the
//! design this follows chooses fail-fast deliberately, since silent
//! recovery on a half-duplex link can desynchronise both peers without
//! detection).

use std::time::Duration;

use log::{debug, info, trace};

use crate::constants::{
    DENSITY_PROBES, ERASE, FLASH_BASE, GET, GET_INFO_SETTLE_DELAY_MS, GO, MAX_READ_CHUNK,
    MAX_WRITE_CHUNK, MIN_POST_PROBE_TIMEOUT_MS, PROBE_TIMEOUT_MS, READ, READ_PROGRESS_STEP,
    SECTOR_SIZE, SYNC_MAX_ATTEMPTS, SYNC_RETRY_DELAY_MS, WRITE, WRITE_PROGRESS_STEP,
};
use crate::constants::{ACK, NACK};
use crate::error::{Error, Result};
use crate::framing;
use crate::progress::{LoggingProgress, NullProgress, ProgressReporter};
use crate::transport::SerialPort;

/// Device profile produced by [`Stm8Bootloader::get_info`].
///
/// Not persisted: there is no `Default` impl, since a sentinel value
/// would misrepresent a device that was never probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub flash_size_kb: u32,
    pub bsl_version: u8,
}

/// The protocol engine. Owns a port handle exclusively; single-
/// threaded, synchronous, no internal locking.
pub struct Stm8Bootloader<P> {
    port: P,
}

impl<P> Stm8Bootloader<P>
where
    P: SerialPort,
{
    /// Wrap an already-open, already-configured port. Does not perform
    /// any wire transaction — call [`sync`](Self::sync) first.
    pub fn new(port: P) -> Self {
        Stm8Bootloader { port }
    }

    /// Release the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Align the target's autobaud detector and confirm it is
    /// listening.
    ///
    /// Flushes the port, then sends a single `SYNCH` byte up to 15
    /// times, waiting for a 1-byte reply each round. Both `ACK` and
    /// `NACK` count as success (`NACK` means "already synchronised").
    /// A garbage byte in the reply slot is a protocol violation, not a
    /// reason to keep retrying — it means the channel state can no
    /// longer be trusted.
    pub fn sync(&mut self) -> Result<()> {
        self.port.flush()?;

        for attempt in 1..=SYNC_MAX_ATTEMPTS {
            trace!("sync attempt {}/{}", attempt, SYNC_MAX_ATTEMPTS);
            self.send_frame(&[crate::constants::SYNCH])?;

            let mut reply = [0u8; 1];
            match self.port.receive(&mut reply)? {
                0 => {
                    // Silent round: target hasn't replied yet.
                }
                _ => match reply[0] {
                    ACK | NACK => {
                        debug!("synchronised after {} attempt(s)", attempt);
                        return Ok(());
                    }
                    got => {
                        return Err(Error::UnexpectedByte { expected: ACK, got });
                    }
                },
            }

            retry_delay();
        }

        Err(Error::SyncFailed {
            attempts: SYNC_MAX_ATTEMPTS,
        })
    }

    /// Deduce flash density via descending-address `memCheck` probes,
    /// then read the BSL version via the `GET` command.
    ///
    /// The port's read timeout is temporarily shortened for the probe
    /// phase (negative probes would otherwise each cost a full timeout)
    /// and is always restored before this function returns, success or
    /// failure.
    pub fn get_info(&mut self) -> Result<DeviceInfo> {
        self.port.flush()?;
        settle_delay();

        let prior_timeout = self.port.timeout_ms();
        self.port.set_timeout(PROBE_TIMEOUT_MS)?;

        let probe_result = self.probe_density();

        let restored = if prior_timeout == 0 {
            MIN_POST_PROBE_TIMEOUT_MS
        } else {
            prior_timeout
        };
        self.port.set_timeout(restored)?;

        let flash_size_kb = probe_result?.ok_or(Error::DeviceNotIdentified)?;
        let bsl_version = self.get_bsl_version()?;

        Ok(DeviceInfo {
            flash_size_kb,
            bsl_version,
        })
    }

    fn probe_density(&mut self) -> Result<Option<u32>> {
        for &(addr, size_kb) in DENSITY_PROBES {
            if self.mem_check(addr)? {
                debug!("density probe at {:#08X} succeeded: {} kB", addr, size_kb);
                return Ok(Some(size_kb));
            }
        }
        Ok(None)
    }

    fn get_bsl_version(&mut self) -> Result<u8> {
        self.send_cmd(GET)?;

        let mut resp = [0u8; 9];
        self.port.receive_exact(&mut resp)?;

        if resp[0] != ACK {
            return Err(Error::ProtocolViolation(format!(
                "GET response missing leading ACK (byte 0 = {:#04x})",
                resp[0]
            )));
        }
        if resp[8] != ACK {
            return Err(Error::ProtocolViolation(format!(
                "GET response missing trailing ACK (byte 8 = {:#04x})",
                resp[8]
            )));
        }

        for (expected, &got) in [GET, READ, GO, WRITE, ERASE].iter().zip(resp[3..8].iter()) {
            if *expected != got {
                return Err(Error::UnexpectedByte {
                    expected: *expected,
                    got,
                });
            }
        }

        Ok(resp[2])
    }

    /// Probe whether `addr` is a readable address: the first three
    /// phases of a 1-byte `memRead`, without the data phase.
    pub fn mem_check(&mut self, addr: u32) -> Result<bool> {
        self.send_cmd(READ)?;
        self.expect_ack()?;

        self.send_frame(&framing::encode_addr(addr))?;

        let mut reply = [0u8; 1];
        self.port.receive_exact(&mut reply)?;
        Ok(reply[0] == ACK)
    }

    /// Read `out.len()` bytes starting at `start`, in chunks of up to
    /// 256 bytes, with no progress reporting.
    pub fn mem_read(&mut self, start: u32, out: &mut [u8]) -> Result<()> {
        self.mem_read_with_progress(start, out, &mut NullProgress)
    }

    /// Same as [`mem_read`](Self::mem_read), reporting chunk progress
    /// through `progress` (every 2 KiB).
    pub fn mem_read_with_progress(
        &mut self,
        start: u32,
        out: &mut [u8],
        progress: &mut dyn ProgressReporter,
    ) -> Result<()> {
        progress.start(out.len());

        let mut offset = 0usize;
        let mut since_report = 0usize;
        while offset < out.len() {
            let chunk_len = (out.len() - offset).min(MAX_READ_CHUNK);
            let addr = start + offset as u32;

            self.send_cmd(READ)?;
            self.expect_ack()?;

            self.send_frame(&framing::encode_addr(addr))?;
            self.expect_ack()?;

            let len_byte = framing::encode_len(chunk_len);
            self.send_frame(&framing::cmd_frame(len_byte))?;

            let mut reply = [0u8; MAX_READ_CHUNK + 1];
            let reply = &mut reply[..chunk_len + 1];
            self.port.receive_exact(reply)?;
            if reply[0] != ACK {
                return Err(Error::UnexpectedByte {
                    expected: ACK,
                    got: reply[0],
                });
            }
            out[offset..offset + chunk_len].copy_from_slice(&reply[1..]);

            offset += chunk_len;
            since_report += chunk_len;
            if since_report >= READ_PROGRESS_STEP {
                progress.advance(since_report);
                since_report = 0;
            }
        }

        if since_report > 0 {
            progress.advance(since_report);
        }
        progress.finish();
        Ok(())
    }

    /// Erase the single 1 KiB sector containing `addr`. Bulk erase is
    /// out of scope; callers erase sector-by-sector.
    pub fn flash_erase(&mut self, addr: u32) -> Result<()> {
        if addr < FLASH_BASE {
            return Err(Error::ProtocolViolation(format!(
                "address {:#08X} is below flash base {:#08X}",
                addr, FLASH_BASE
            )));
        }

        let sector = ((addr - FLASH_BASE) / SECTOR_SIZE) as u8;
        info!("erasing sector {} (address {:#08X})", sector, addr);

        self.send_cmd(ERASE)?;
        self.expect_ack()?;

        self.send_frame(&[0x00, sector, 0x00 ^ sector])?;
        self.expect_ack()?;

        Ok(())
    }

    /// Write `data` starting at `start`, in chunks of up to 128 bytes.
    ///
    /// `verbose` selects between silent (`NullProgress`) and logged
    /// (`LoggingProgress`) reporting — `memWrite` is used both for
    /// user-visible flash programming and for quiet uploads of helper
    /// routines to RAM.
    pub fn mem_write(&mut self, start: u32, data: &[u8], verbose: bool) -> Result<()> {
        if verbose {
            let mut progress = LoggingProgress::default();
            self.mem_write_with_progress(start, data, &mut progress)
        } else {
            self.mem_write_with_progress(start, data, &mut NullProgress)
        }
    }

    /// Same as [`mem_write`](Self::mem_write), reporting chunk progress
    /// through `progress` (every 1 KiB).
    pub fn mem_write_with_progress(
        &mut self,
        start: u32,
        data: &[u8],
        progress: &mut dyn ProgressReporter,
    ) -> Result<()> {
        progress.start(data.len());

        let mut offset = 0usize;
        let mut since_report = 0usize;
        while offset < data.len() {
            let chunk_len = (data.len() - offset).min(MAX_WRITE_CHUNK);
            let addr = start + offset as u32;
            let chunk = &data[offset..offset + chunk_len];

            self.send_cmd(WRITE)?;
            self.expect_ack()?;

            self.send_frame(&framing::encode_addr(addr))?;
            self.expect_ack()?;

            self.send_frame(&framing::write_payload(chunk))?;
            self.expect_ack()?;

            offset += chunk_len;
            since_report += chunk_len;
            if since_report >= WRITE_PROGRESS_STEP {
                progress.advance(since_report);
                since_report = 0;
            }
        }

        if since_report > 0 {
            progress.advance(since_report);
        }
        progress.finish();
        Ok(())
    }

    /// Hand control to the program at `addr`. After the second `ACK`
    /// the target has left the bootloader; no further protocol
    /// messages are defined on this handle until it re-enters
    /// bootloader mode.
    pub fn jump_to(&mut self, addr: u32) -> Result<()> {
        self.send_cmd(GO)?;
        self.expect_ack()?;

        self.send_frame(&framing::encode_addr(addr))?;
        self.expect_ack()?;

        Ok(())
    }

    fn send_cmd(&mut self, opcode: u8) -> Result<()> {
        self.send_frame(&framing::cmd_frame(opcode))
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let sent = self.port.send(frame)?;
        if sent != frame.len() {
            return Err(Error::SendShort {
                sent,
                requested: frame.len(),
            });
        }
        Ok(())
    }

    fn expect_ack(&mut self) -> Result<()> {
        let mut reply = [0u8; 1];
        self.port.receive_exact(&mut reply)?;
        if reply[0] != ACK {
            return Err(Error::UnexpectedByte {
                expected: ACK,
                got: reply[0],
            });
        }
        Ok(())
    }
}

fn retry_delay() {
    #[cfg(not(test))]
    std::thread::sleep(Duration::from_millis(SYNC_RETRY_DELAY_MS));
    #[cfg(test)]
    let _ = Duration::from_millis(SYNC_RETRY_DELAY_MS);
}

fn settle_delay() {
    #[cfg(not(test))]
    std::thread::sleep(Duration::from_millis(GET_INFO_SETTLE_DELAY_MS));
    #[cfg(test)]
    let _ = Duration::from_millis(GET_INFO_SETTLE_DELAY_MS);
}
