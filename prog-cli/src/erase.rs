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

pub fn erase(matches: &ArgMatches<'_>) -> Result<()> {
    let addr = common::addr_from_str(matches.value_of("address").unwrap())?;

    let mut device = common::connect(matches)?;

    device
        .flash_erase(addr)
        .with_context(|| format!("Failed to erase the sector containing {:#08X}", addr))?;

    log::info!("Erased sector containing {:#08X}", addr);
    Ok(())
}
