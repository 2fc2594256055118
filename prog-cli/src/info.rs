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

use crate::common;

pub fn info(matches: &ArgMatches<'_>) -> Result<()> {
    let mut device = common::connect(matches)?;

    let info = device
        .get_info()
        .context("Failed to identify the device")?;

    println!("Flash size: {} kB", info.flash_size_kb);
    println!(
        "BSL version: {:x}.{:x}",
        info.bsl_version >> 4,
        info.bsl_version & 0x0F
    );

    Ok(())
}
