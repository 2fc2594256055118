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

//! Integration tests driving `Stm8Bootloader` against scripted and
//! protocol-aware in-memory mock ports, instead of a real serial line.

use std::collections::{HashMap, VecDeque};

use stm8boot::error::{Error, Result};
use stm8boot::transport::{BaudRate, DataBits, Parity, PortSettings, SerialPort, StopBits};
use stm8boot::Stm8Bootloader;

const ACK: u8 = 0x79;
const NACK: u8 = 0x1F;

/// A port driven by a fixed byte script, for tests where the exact
/// wire trace is known up front.
///
/// `silent_rounds` lets a test hold back replies for the first N calls
/// to `receive`, independent of what has been queued, to model a
/// target that is slow to answer `sync`'s retries.
struct ScriptedPort {
    replies: VecDeque<u8>,
    silent_rounds: usize,
    sent: Vec<u8>,
    timeout_ms: u32,
    attrs: PortSettings,
}

impl ScriptedPort {
    fn new() -> Self {
        ScriptedPort {
            replies: VecDeque::new(),
            silent_rounds: 0,
            sent: Vec::new(),
            timeout_ms: 1000,
            attrs: PortSettings::default(),
        }
    }

    fn with_silence(mut self, rounds: usize) -> Self {
        self.silent_rounds = rounds;
        self
    }

    fn push(mut self, bytes: &[u8]) -> Self {
        self.replies.extend(bytes.iter().copied());
        self
    }
}

impl SerialPort for ScriptedPort {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_attributes(&self) -> Result<PortSettings> {
        Ok(self.attrs)
    }

    fn set_attributes(&mut self, attrs: &PortSettings) -> Result<()> {
        self.attrs = *attrs;
        Ok(())
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<()> {
        self.timeout_ms = timeout_ms;
        self.attrs.timeout_ms = timeout_ms;
        Ok(())
    }

    fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        self.sent.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.silent_rounds > 0 {
            self.silent_rounds -= 1;
            return Ok(0);
        }
        let n = buf.len().min(self.replies.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.replies.pop_front().unwrap();
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn default_settings() -> PortSettings {
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

#[test]
fn sync_immediate_ack() {
    let port = ScriptedPort::new().push(&[ACK]);
    let mut dev = Stm8Bootloader::new(port);
    assert!(dev.sync().is_ok());
    assert_eq!(dev.into_inner().sent, vec![0x7F]);
}

#[test]
fn sync_after_three_silent_rounds_then_nack() {
    let port = ScriptedPort::new().with_silence(3).push(&[NACK]);
    let mut dev = Stm8Bootloader::new(port);
    assert!(dev.sync().is_ok());
}

#[test]
fn sync_treats_nack_as_success() {
    let port = ScriptedPort::new().push(&[NACK]);
    let mut dev = Stm8Bootloader::new(port);
    assert!(dev.sync().is_ok());
}

#[test]
fn sync_succeeds_at_every_round() {
    for k in 1..=15usize {
        let port = ScriptedPort::new().with_silence(k - 1).push(&[ACK]);
        let mut dev = Stm8Bootloader::new(port);
        assert!(dev.sync().is_ok(), "expected sync to succeed at round {}", k);
    }
}

#[test]
fn sync_fails_after_exhausting_all_attempts() {
    let port = ScriptedPort::new().with_silence(15);
    let mut dev = Stm8Bootloader::new(port);
    match dev.sync() {
        Err(Error::SyncFailed { attempts: 15 }) => {}
        other => panic!("expected SyncFailed {{ attempts: 15 }}, got {:?}", other),
    }
}

#[test]
fn sync_reports_unexpected_byte() {
    let port = ScriptedPort::new().push(&[0x42]);
    let mut dev = Stm8Bootloader::new(port);
    match dev.sync() {
        Err(Error::UnexpectedByte { expected: ACK, got: 0x42 }) => {}
        other => panic!("expected UnexpectedByte, got {:?}", other),
    }
}

#[test]
fn identify_32kb_device_bsl_v1_2() {
    // memCheck(0x047FFF): cmd ACK, address NACK (not readable).
    // memCheck(0x027FFF): cmd ACK, address NACK.
    // memCheck(0x00FFFF): cmd ACK, address ACK (readable) -> 32 kB.
    // GET response: [ACK, nBytes, bslVersion, GET, READ, GO, WRITE, ERASE, ACK]
    let port = ScriptedPort::new()
        .push(&[ACK, NACK])
        .push(&[ACK, NACK])
        .push(&[ACK, ACK])
        .push(&[ACK, 0x06, 0x12, 0x00, 0x11, 0x21, 0x31, 0x43, ACK]);
    let mut dev = Stm8Bootloader::new(port);

    let info = dev.get_info().expect("getInfo should succeed");
    assert_eq!(info.flash_size_kb, 32);
    assert_eq!(info.bsl_version, 0x12);
}

#[test]
fn get_info_restores_prior_timeout() {
    let port = ScriptedPort::new()
        .push(&[ACK, ACK]) // 0x047FFF succeeds immediately
        .push(&[ACK, 0x06, 0x12, 0x00, 0x11, 0x21, 0x31, 0x43, ACK]);
    let mut dev = Stm8Bootloader::new(port);

    dev.get_info().expect("getInfo should succeed");
    let port = dev.into_inner();
    assert_eq!(port.timeout_ms, 1000);
}

#[test]
fn get_info_with_zero_prior_timeout_restores_minimum() {
    let mut port = ScriptedPort::new()
        .push(&[ACK, ACK])
        .push(&[ACK, 0x06, 0x12, 0x00, 0x11, 0x21, 0x31, 0x43, ACK]);
    port.timeout_ms = 0;
    let mut dev = Stm8Bootloader::new(port);

    dev.get_info().expect("getInfo should succeed");
    assert_eq!(dev.into_inner().timeout_ms, 1000);
}

#[test]
fn get_info_density_resolution_for_each_supported_size() {
    // (addr that ACKs, expected flash_size_kb), probed in descending order
    // 0x047FFF(256), 0x027FFF(128), 0x00FFFF(32), 0x009FFF(8).
    let cases: &[(u8, u32)] = &[
        // every probe up to and including the ACKing one
        (0, 256),
        (1, 128),
        (2, 32),
        (3, 8),
    ];

    for &(acking_index, expected_kb) in cases {
        let mut port = ScriptedPort::new();
        for i in 0..4u8 {
            if i < acking_index {
                port = port.push(&[ACK, NACK]);
            } else if i == acking_index {
                port = port.push(&[ACK, ACK]);
                break;
            }
        }
        port = port.push(&[ACK, 0x06, 0x10, 0x00, 0x11, 0x21, 0x31, 0x43, ACK]);

        let mut dev = Stm8Bootloader::new(port);
        let info = dev.get_info().unwrap_or_else(|e| {
            panic!("getInfo failed for density case {} kB: {:?}", expected_kb, e)
        });
        assert_eq!(info.flash_size_kb, expected_kb);
    }
}

#[test]
fn get_info_fails_when_no_density_probe_succeeds() {
    let port = ScriptedPort::new()
        .push(&[ACK, NACK])
        .push(&[ACK, NACK])
        .push(&[ACK, NACK])
        .push(&[ACK, NACK]);
    let mut dev = Stm8Bootloader::new(port);
    assert!(matches!(dev.get_info(), Err(Error::DeviceNotIdentified)));
}

#[test]
fn read_three_bytes_from_flash_base() {
    // [READ,~READ] -> ACK; encode_addr(0x8000) -> ACK; [0x02,0xFD] -> ACK + data
    let port = ScriptedPort::new()
        .push(&[ACK])
        .push(&[ACK])
        .push(&[ACK, 0xAA, 0xBB, 0xCC]);
    let mut dev = Stm8Bootloader::new(port);

    let mut buf = [0u8; 3];
    dev.mem_read(0x8000, &mut buf).expect("memRead should succeed");
    assert_eq!(buf, [0xAA, 0xBB, 0xCC]);

    let sent = dev.into_inner().sent;
    assert_eq!(sent, vec![0x11, 0xEE, 0x00, 0x00, 0x80, 0x00, 0x80, 0x02, 0xFD]);
}

#[test]
fn write_two_bytes_to_flash_base() {
    let port = ScriptedPort::new().push(&[ACK]).push(&[ACK]).push(&[ACK]);
    let mut dev = Stm8Bootloader::new(port);

    dev.mem_write(0x8000, &[0x12, 0x34], false)
        .expect("memWrite should succeed");

    let sent = dev.into_inner().sent;
    assert_eq!(
        sent,
        vec![0x31, 0xCE, 0x00, 0x00, 0x80, 0x00, 0x80, 0x01, 0x12, 0x34, 0x27]
    );
}

#[test]
fn erase_sector_containing_address() {
    // sector = (0x8C00 - 0x8000) / 1024 = 3
    let port = ScriptedPort::new().push(&[ACK]).push(&[ACK]);
    let mut dev = Stm8Bootloader::new(port);

    dev.flash_erase(0x8C00).expect("flashErase should succeed");

    let sent = dev.into_inner().sent;
    assert_eq!(sent, vec![0x43, 0xBC, 0x00, 0x03, 0x03]);
}

#[test]
fn flash_erase_rejects_address_below_flash_base() {
    let port = ScriptedPort::new();
    let mut dev = Stm8Bootloader::new(port);
    assert!(matches!(
        dev.flash_erase(0x1000),
        Err(Error::ProtocolViolation(_))
    ));
}

#[test]
fn jump_to_address() {
    let port = ScriptedPort::new().push(&[ACK]).push(&[ACK]);
    let mut dev = Stm8Bootloader::new(port);

    dev.jump_to(0x8000).expect("jumpTo should succeed");

    let sent = dev.into_inner().sent;
    assert_eq!(sent, vec![0x21, 0xDE, 0x00, 0x00, 0x80, 0x00, 0x80]);
}

/// A protocol-aware mock that actually interprets `READ`/`WRITE`
/// frames against a backing memory map, so round-trip coverage across
/// many lengths and offsets doesn't require hand-scripted byte traces.
struct MemoryTarget {
    memory: HashMap<u32, u8>,
    phase: Phase,
    out: VecDeque<u8>,
    timeout_ms: u32,
    attrs: PortSettings,
}

#[derive(Clone, Copy)]
enum Phase {
    Idle,
    ReadAwaitAddr,
    ReadAwaitLen { addr: u32 },
    WriteAwaitAddr,
    WriteAwaitPayload { addr: u32 },
}

impl MemoryTarget {
    fn new() -> Self {
        MemoryTarget {
            memory: HashMap::new(),
            phase: Phase::Idle,
            out: VecDeque::new(),
            timeout_ms: 1000,
            attrs: default_settings(),
        }
    }
}

impl SerialPort for MemoryTarget {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_attributes(&self) -> Result<PortSettings> {
        Ok(self.attrs)
    }

    fn set_attributes(&mut self, attrs: &PortSettings) -> Result<()> {
        self.attrs = *attrs;
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
        match (self.phase, bytes) {
            (Phase::Idle, [0x11, 0xEE]) => {
                self.out.push_back(ACK);
                self.phase = Phase::ReadAwaitAddr;
            }
            (Phase::Idle, [0x31, 0xCE]) => {
                self.out.push_back(ACK);
                self.phase = Phase::WriteAwaitAddr;
            }
            (Phase::ReadAwaitAddr, frame) if frame.len() == 5 => {
                let addr = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
                self.out.push_back(ACK);
                self.phase = Phase::ReadAwaitLen { addr };
            }
            (Phase::WriteAwaitAddr, frame) if frame.len() == 5 => {
                let addr = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
                self.out.push_back(ACK);
                self.phase = Phase::WriteAwaitPayload { addr };
            }
            (Phase::ReadAwaitLen { addr }, [len_byte, _complement]) => {
                let len = *len_byte as usize + 1;
                self.out.push_back(ACK);
                for i in 0..len {
                    let a = addr + i as u32;
                    self.out.push_back(*self.memory.get(&a).unwrap_or(&0));
                }
                self.phase = Phase::Idle;
            }
            (Phase::WriteAwaitPayload { addr }, frame) => {
                let len = frame[0] as usize + 1;
                let data = &frame[1..1 + len];
                for (i, &b) in data.iter().enumerate() {
                    self.memory.insert(addr + i as u32, b);
                }
                self.out.push_back(ACK);
                self.phase = Phase::Idle;
            }
            _ => panic!("unexpected frame {:?} in phase", bytes),
        }
        Ok(bytes.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.out.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.out.pop_front().unwrap();
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn mem_write_then_mem_read_round_trips() {
    for &(len, start) in &[
        (1usize, 0x8000u32),
        (2, 0x8001),
        (255, 0x8000),
        (256, 0x8000),
        (257, 0x8100),
        (511, 0x8000),
        (1024, 0x8300),
        (4096, 0x9000),
        (4096, 0x9001),
    ] {
        let port = MemoryTarget::new();
        let mut dev = Stm8Bootloader::new(port);

        let data: Vec<u8> = (0..len).map(|i| (i * 31 + 7) as u8).collect();
        dev.mem_write(start, &data, false)
            .unwrap_or_else(|e| panic!("memWrite failed for len={} start={:#X}: {:?}", len, start, e));

        let mut out = vec![0u8; len];
        dev.mem_read(start, &mut out)
            .unwrap_or_else(|e| panic!("memRead failed for len={} start={:#X}: {:?}", len, start, e));

        assert_eq!(out, data, "round-trip mismatch for len={} start={:#X}", len, start);
    }
}

#[test]
fn mem_read_of_unwritten_memory_is_zero_filled() {
    let port = MemoryTarget::new();
    let mut dev = Stm8Bootloader::new(port);

    let mut out = [0xFFu8; 16];
    dev.mem_read(0xA000, &mut out).expect("memRead should succeed");
    assert_eq!(out, [0u8; 16]);
}
