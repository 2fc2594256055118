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

//! Wire-level constants for the STM8 UART ROM bootloader protocol.

/// Synchronisation byte, sent to lock the target's autobaud detector.
pub const SYNCH: u8 = 0x7F;
/// Positive acknowledgement.
pub const ACK: u8 = 0x79;
/// Negative acknowledgement (also "already synchronised" during `sync`).
pub const NACK: u8 = 0x1F;

pub const GET: u8 = 0x00;
pub const READ: u8 = 0x11;
pub const GO: u8 = 0x21;
pub const WRITE: u8 = 0x31;
pub const ERASE: u8 = 0x43;

/// Number of `SYNCH` rounds `sync` will attempt before giving up.
pub const SYNC_MAX_ATTEMPTS: u32 = 15;
/// Delay between `sync` rounds, absorbing target processing time.
pub const SYNC_RETRY_DELAY_MS: u64 = 10;
/// Settle delay before `getInfo` starts probing, same rationale as
/// `SYNC_RETRY_DELAY_MS`.
pub const GET_INFO_SETTLE_DELAY_MS: u64 = 10;

/// Top address of each supported flash density, highest first.
///
/// `memCheck` against each of these in turn is how `getInfo` deduces
/// `flash_size_kb` without a dedicated "identify" command.
pub const DENSITY_PROBES: &[(u32, u32)] = &[
    (0x047FFF, 256),
    (0x027FFF, 128),
    (0x00FFFF, 32),
    (0x009FFF, 8),
];

/// Timeout used while probing flash density; restored afterwards.
pub const PROBE_TIMEOUT_MS: u32 = 100;
/// Minimum timeout restored after density probing completes.
pub const MIN_POST_PROBE_TIMEOUT_MS: u32 = 1000;

/// Flash erase sector size, in bytes, on the STM8 family.
pub const SECTOR_SIZE: u32 = 1024;
/// Start of the flash address space sector numbering is relative to.
pub const FLASH_BASE: u32 = 0x8000;

/// Maximum bytes per `memRead` chunk (the `N-1` wire encoding caps out
/// at 256 entries).
pub const MAX_READ_CHUNK: usize = 256;
/// Maximum bytes per `memWrite` chunk, per protocol.
pub const MAX_WRITE_CHUNK: usize = 128;

/// Emit a progress update every this many bytes during `memRead`.
pub const READ_PROGRESS_STEP: usize = 2048;
/// Emit a progress update every this many bytes during `memWrite`.
pub const WRITE_PROGRESS_STEP: usize = 1024;
