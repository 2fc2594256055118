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

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use stm8boot::constants::{FLASH_BASE, SECTOR_SIZE};

use crate::common::{self, IndicatifProgress};

/// `program` subcommand entry point: sync -> identify -> (erase if
/// requested) -> write -> verify -> jump.
pub fn program(matches: &ArgMatches<'_>) -> Result<()> {
    let addr = common::addr_from_str(matches.value_of("address").unwrap())?;
    let in_path = matches.value_of("FILE").unwrap();
    let do_erase = matches.is_present("erase");

    let data = fs::read(in_path)
        .with_context(|| format!("Couldn't read input file `{}`", in_path))?;
    log::info!("`{}`: {} bytes", in_path, data.len());

    if addr < FLASH_BASE {
        bail!(
            "start address {:#08X} is below flash base {:#08X}",
            addr,
            FLASH_BASE
        );
    }

    let mut device = common::connect(matches)?;

    let info = device
        .get_info()
        .context("Failed to identify the device")?;
    log::info!(
        "Flash size: {} kB, BSL v{:x}.{:x}",
        info.flash_size_kb,
        info.bsl_version >> 4,
        info.bsl_version & 0x0F
    );

    let end_addr = addr + data.len() as u32;
    let flash_end = FLASH_BASE + info.flash_size_kb * 1024;
    if end_addr > flash_end {
        bail!(
            "binary file is too large for flash (end address {:#08X}, flash ends at {:#08X})",
            end_addr,
            flash_end
        );
    }

    if do_erase {
        let first_sector = (addr - FLASH_BASE) / SECTOR_SIZE;
        let last_sector = (end_addr - 1 - FLASH_BASE) / SECTOR_SIZE;
        for sector in first_sector..=last_sector {
            let sector_addr = FLASH_BASE + sector * SECTOR_SIZE;
            log::info!("Erasing sector {} ({:#08X})", sector, sector_addr);
            device
                .flash_erase(sector_addr)
                .with_context(|| format!("Failed to erase sector {}", sector))?;
        }
    }

    let mut progress = IndicatifProgress::default();
    device
        .mem_write_with_progress(addr, &data, &mut progress)
        .with_context(|| format!("Failed to write {} bytes at {:#08X}", data.len(), addr))?;

    let mut readback = vec![0u8; data.len()];
    device
        .mem_read(addr, &mut readback)
        .context("Failed to read back the written data for verification")?;
    if readback != data {
        bail!("verification failed: flash contents don't match the file that was written");
    }
    log::info!("Verification OK");

    device
        .jump_to(addr)
        .with_context(|| format!("Failed to jump to {:#08X}", addr))?;
    log::info!("Jumped to {:#08X}", addr);

    Ok(())
}
