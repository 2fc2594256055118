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

use std::fs::File;
use std::io::Write as _;

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::common::{self, IndicatifProgress};

pub fn read(matches: &ArgMatches<'_>) -> Result<()> {
    let addr = common::addr_from_str(matches.value_of("address").unwrap())?;
    let count: usize = matches
        .value_of("count")
        .unwrap()
        .parse()
        .context("Invalid byte count")?;
    let out_path = matches.value_of("output").unwrap();

    let mut device = common::connect(matches)?;

    let mut buf = vec![0u8; count];
    let mut progress = IndicatifProgress::default();
    device
        .mem_read_with_progress(addr, &mut buf, &mut progress)
        .with_context(|| format!("Failed to read {} bytes from {:#08X}", count, addr))?;

    let mut file = File::create(out_path)
        .with_context(|| format!("Couldn't create output file `{}`", out_path))?;
    file.write_all(&buf)
        .context("Failed to write output file")?;

    log::info!("Wrote {} bytes to `{}`", buf.len(), out_path);
    Ok(())
}
