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

//! Stateless framing and checksum helpers.
//!
//! These never touch a port; they only turn protocol-level values into
//! the exact bytes the target expects, and back.

/// XOR checksum over a byte slice.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Two-byte command frame: `[opcode, !opcode]`.
#[inline]
pub fn cmd_frame(opcode: u8) -> [u8; 2] {
    [opcode, !opcode]
}

/// `N-1` wire length encoding, `1 <= n <= 256`.
///
/// # Panics
///
/// Panics if `n` is `0` or greater than `256` — both are caller bugs,
/// never something the wire can legitimately ask for.
#[inline]
pub fn encode_len(n: usize) -> u8 {
    assert!(n >= 1 && n <= 256, "chunk length out of range: {}", n);
    (n - 1) as u8
}

/// Big-endian address frame: `[a24, a16, a8, a0, checksum]`.
#[inline]
pub fn encode_addr(addr: u32) -> [u8; 5] {
    let b = addr.to_be_bytes();
    [b[0], b[1], b[2], b[3], checksum(&b)]
}

/// Build the payload frame for a write chunk: `[n-1, d0..dn-1, checksum]`
/// where `checksum` folds in the length byte, matching the wire's
/// `(len - 1) XOR fold(data)` convention.
pub fn write_payload(data: &[u8]) -> Vec<u8> {
    let len_byte = encode_len(data.len());
    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.push(len_byte);
    frame.extend_from_slice(data);
    frame.push(checksum(&frame));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_frame_second_byte_is_complement() {
        for b in 0u16..=255 {
            let b = b as u8;
            assert_eq!(cmd_frame(b)[1], b ^ 0xFF);
        }
    }

    #[test]
    fn encode_addr_bytes_and_checksum() {
        for addr in [0u32, 1, 0x8000, 0x00FFFF, 0x047FFF, 0xFFFFFFFF] {
            let frame = encode_addr(addr);
            let be = addr.to_be_bytes();
            assert_eq!(&frame[0..4], &be);
            assert_eq!(frame[4], be[0] ^ be[1] ^ be[2] ^ be[3]);
        }
    }

    #[test]
    fn encode_len_is_n_minus_one() {
        for n in 1..=256usize {
            assert_eq!(encode_len(n), (n - 1) as u8);
        }
    }

    #[test]
    #[should_panic]
    fn encode_len_rejects_zero() {
        encode_len(0);
    }

    #[test]
    #[should_panic]
    fn encode_len_rejects_too_large() {
        encode_len(257);
    }

    #[test]
    fn write_payload_checksum() {
        for len in [1usize, 2, 64, 128] {
            let data: Vec<u8> = (0..len as u32).map(|i| (i * 7 + 3) as u8).collect();
            let frame = write_payload(&data);
            assert_eq!(frame[0], (len - 1) as u8);
            assert_eq!(&frame[1..1 + len], data.as_slice());

            let expected = (len as u8 - 1) ^ data.iter().fold(0u8, |acc, b| acc ^ b);
            assert_eq!(*frame.last().unwrap(), expected);
        }
    }

    #[test]
    fn write_payload_example_from_spec() {
        // Write 2 bytes [0x12, 0x34] -> [0x01, 0x12, 0x34, 0x27]
        let frame = write_payload(&[0x12, 0x34]);
        assert_eq!(frame, vec![0x01, 0x12, 0x34, 0x27]);
    }
}
