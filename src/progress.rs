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

//! Progress reporting, decoupled from any particular presentation.
//!
//! `memRead`/`memWrite` report chunk-by-chunk progress through this
//! trait instead of a concrete progress-bar dependency, so the CLI's
//! `indicatif` bars (or a silent no-op, for uploads that shouldn't be
//! user-visible) plug in at the call site.

/// Receives byte-granularity progress updates for a single transfer.
pub trait ProgressReporter {
    /// Total size of the transfer is now known.
    fn start(&mut self, total_bytes: usize) {
        let _ = total_bytes;
    }

    /// `done_bytes` additional bytes have been transferred.
    fn advance(&mut self, done_bytes: usize) {
        let _ = done_bytes;
    }

    /// The transfer finished (successfully; errors are reported by the
    /// caller's `Result`, not through this trait).
    fn finish(&mut self) {}
}

/// Reports nothing. Used for transfers that must stay silent, e.g.
/// uploading a helper routine rather than user-visible flashing.
pub struct NullProgress;

impl ProgressReporter for NullProgress {}

/// Reports through `log`, for the verbose `memWrite` path and anywhere
/// else that doesn't care to build a progress bar.
#[derive(Default)]
pub struct LoggingProgress {
    done: usize,
    total: usize,
}

impl ProgressReporter for LoggingProgress {
    fn start(&mut self, total_bytes: usize) {
        self.done = 0;
        self.total = total_bytes;
        log::debug!("starting transfer of {} bytes", total_bytes);
    }

    fn advance(&mut self, done_bytes: usize) {
        self.done += done_bytes;
        log::info!("{}/{} bytes transferred", self.done, self.total);
    }

    fn finish(&mut self) {
        log::debug!("transfer of {} bytes complete", self.done);
    }
}
