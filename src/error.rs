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

//! Error taxonomy for the transport and protocol layers.

use std::io;

/// Errors returned by this crate.
///
/// The engine never retries past what's explicitly documented (`sync`'s
/// own bounded loop): any other error aborts the current operation and
/// leaves the port open in an indeterminate protocol state, per the
/// fail-fast design.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation attempted on a closed/invalid handle.
    #[error("port is not open")]
    NotOpen,

    /// The OS refused to open the requested device.
    #[error("failed to open port: {0}")]
    OpenFailed(#[source] io::Error),

    /// The OS accepted the open but rejected the requested attributes.
    #[error("failed to configure port: {0}")]
    ConfigFailed(#[source] io::Error),

    /// Releasing OS resources for the port failed.
    #[error("failed to close port: {0}")]
    CloseFailed(#[source] io::Error),

    /// `send` accepted fewer bytes than requested.
    #[error("short write: sent {sent} of {requested} bytes")]
    SendShort { sent: usize, requested: usize },

    /// A response did not arrive within the configured read timeout.
    #[error("timed out waiting for a response")]
    Timeout,

    /// A byte in an ACK slot (or a GET command-echo byte) was wrong.
    #[error("unexpected byte: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedByte { expected: u8, got: u8 },

    /// `sync` exhausted its retry budget without a valid reply.
    #[error("synchronisation failed after {attempts} attempts")]
    SyncFailed { attempts: u32 },

    /// `getInfo`'s density probes all failed.
    #[error("could not identify device: no density probe succeeded")]
    DeviceNotIdentified,

    /// The target's response violated the framing contract in a way not
    /// covered by a more specific variant (e.g. wrong GET response
    /// length).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Any other I/O error surfaced from the transport.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
