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

use anyhow::{Context, Result};
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressStyle};
use stm8boot::transport::{self, BaudRate, PortSettings};
use stm8boot::{ProgressReporter, Stm8Bootloader};

/// Opens the port named by `-p/--port`, applies `-b/--baud`, and
/// synchronises with the target. Every subcommand starts here.
pub fn connect(matches: &ArgMatches<'_>) -> Result<Stm8Bootloader<transport::SerialHandle>> {
    let port_name = matches.value_of("port").unwrap();
    let baud = baud_from_str(matches.value_of("baud").unwrap())?;

    let mut settings = PortSettings::default();
    settings.baud_rate = baud;

    log::info!("Opening serial port `{}`", port_name);
    log::info!("Baud rate: {}", baud);
    let port = transport::open(port_name, &settings)
        .with_context(|| format!("Couldn't open serial port `{}`", port_name))?;

    let mut device = Stm8Bootloader::new(port);
    log::info!("Synchronising with the bootloader");
    device.sync().context("Failed to synchronize with the bootloader")?;

    Ok(device)
}

pub fn baud_from_str(s: &str) -> Result<BaudRate> {
    Ok(match s.parse::<u32>().context("Invalid baud rate")? {
        4800 => BaudRate::Baud4800,
        9600 => BaudRate::Baud9600,
        14400 => BaudRate::Baud14400,
        19200 => BaudRate::Baud19200,
        28800 => BaudRate::Baud28800,
        38400 => BaudRate::Baud38400,
        57600 => BaudRate::Baud57600,
        115200 => BaudRate::Baud115200,
        n => anyhow::bail!(
            "unsupported baud rate {}, must be one of 4800/9600/14400/19200/28800/38400/57600/115200",
            n
        ),
    })
}

/// Parses an address argument, accepting both `0x`-prefixed hex and
/// plain decimal.
pub fn addr_from_str(s: &str) -> Result<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).context("Invalid address, expected a hexadecimal number")
    } else {
        s.parse::<u32>().context("Invalid address")
    }
}

/// A user-visible progress bar for `read`/`write`/`program`, built on
/// the library's [`ProgressReporter`] hook rather than anything
/// baked into the protocol engine.
pub struct IndicatifProgress {
    bar: ProgressBar,
    done: u64,
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        IndicatifProgress {
            bar: ProgressBar::hidden(),
            done: 0,
        }
    }
}

impl ProgressReporter for IndicatifProgress {
    fn start(&mut self, total_bytes: usize) {
        self.done = 0;
        self.bar = ProgressBar::new(total_bytes as u64);
        self.bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})"),
        );
    }

    fn advance(&mut self, done_bytes: usize) {
        self.done += done_bytes as u64;
        self.bar.set_position(self.done);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
