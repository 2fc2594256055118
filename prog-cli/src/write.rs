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

use std::fs;

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::common::{self, IndicatifProgress};

pub fn write(matches: &ArgMatches<'_>) -> Result<()> {
    let addr = common::addr_from_str(matches.value_of("address").unwrap())?;
    let in_path = matches.value_of("FILE").unwrap();

    let data = fs::read(in_path)
        .with_context(|| format!("Couldn't read input file `{}`", in_path))?;
    log::info!("`{}`: {} bytes", in_path, data.len());

    let mut device = common::connect(matches)?;

    let mut progress = IndicatifProgress::default();
    device
        .mem_write_with_progress(addr, &data, &mut progress)
        .with_context(|| format!("Failed to write {} bytes at {:#08X}", data.len(), addr))?;

    log::info!("Wrote {} bytes at {:#08X}", data.len(), addr);
    Ok(())
}
