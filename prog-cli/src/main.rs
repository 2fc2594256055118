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

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{crate_authors, crate_version, App, AppSettings, Arg, SubCommand};

mod common;
mod erase;
mod info;
mod jump;
mod list;
mod program;
mod read;
mod write;

#[cfg(unix)]
const DEFAULT_PORT: &str = "/dev/ttyUSB0";
#[cfg(windows)]
const DEFAULT_PORT: &str = "COM1";

fn main() -> Result<()> {
    let port_arg = Arg::with_name("port")
        .short("p")
        .long("port")
        .takes_value(true)
        .default_value(DEFAULT_PORT)
        .help("Serial port to use");
    let baud_arg = Arg::with_name("baud")
        .short("b")
        .long("baud")
        .takes_value(true)
        .default_value("115200")
        .help("Serial port baud rate [4800|9600|14400|19200|28800|38400|57600|115200]");
    let addr_arg = Arg::with_name("address")
        .short("a")
        .long("address")
        .takes_value(true)
        .required(true)
        .help("Target address, decimal or 0x-prefixed hexadecimal");

    let app = App::new("stm8boot")
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(crate_version!())
        .author(crate_authors!())
        .about("Programmer for the STMicroelectronics STM8 UART ROM bootloader")
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity, -v (debug), -vv (trace)"),
        )
        .subcommand(SubCommand::with_name("list").about("List available serial ports"))
        .subcommand(
            SubCommand::with_name("info")
                .about("Synchronise and identify the connected device")
                .arg(&port_arg)
                .arg(&baud_arg),
        )
        .subcommand(
            SubCommand::with_name("read")
                .about("Read flash memory to a file")
                .arg(&port_arg)
                .arg(&baud_arg)
                .arg(&addr_arg)
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .takes_value(true)
                        .required(true)
                        .help("Number of bytes to read"),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .required(true)
                        .help("File to write the read bytes to"),
                ),
        )
        .subcommand(
            SubCommand::with_name("write")
                .about("Write a file's contents to flash memory")
                .arg(&port_arg)
                .arg(&baud_arg)
                .arg(&addr_arg)
                .arg(
                    Arg::with_name("FILE")
                        .required(true)
                        .help("Binary file to write"),
                ),
        )
        .subcommand(
            SubCommand::with_name("erase")
                .about("Erase the flash sector containing an address")
                .arg(&port_arg)
                .arg(&baud_arg)
                .arg(&addr_arg),
        )
        .subcommand(
            SubCommand::with_name("jump")
                .about("Jump to a loaded program")
                .arg(&port_arg)
                .arg(&baud_arg)
                .arg(&addr_arg),
        )
        .subcommand(
            SubCommand::with_name("program")
                .about("Erase, write, verify and jump to a binary file in one step")
                .arg(&port_arg)
                .arg(&baud_arg)
                .arg(&addr_arg)
                .arg(
                    Arg::with_name("erase")
                        .short("e")
                        .long("erase")
                        .help("Erase the sectors covering the file before writing"),
                )
                .arg(
                    Arg::with_name("FILE")
                        .required(true)
                        .help("Binary file to program"),
                ),
        );

    // When double clicking the binary the console window would close
    // immediately on error; keep it open so the message is readable.
    #[cfg(windows)]
    let app = app.setting(AppSettings::WaitOnError);

    let matches = app.get_matches();

    init_logger(match matches.occurrences_of("v") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        2..=u64::MAX => log::LevelFilter::Trace,
    })?;

    match matches.subcommand() {
        ("list", Some(_)) => list::list(),
        ("info", Some(m)) => info::info(m),
        ("read", Some(m)) => read::read(m),
        ("write", Some(m)) => write::write(m),
        ("erase", Some(m)) => erase::erase(m),
        ("jump", Some(m)) => jump::jump(m),
        ("program", Some(m)) => program::program(m),
        _ => unreachable!("SubcommandRequiredElseHelp guarantees a subcommand"),
    }
}

fn init_logger(level: log::LevelFilter) -> Result<()> {
    let mut logger = env_logger::Builder::from_env("STM8BOOT_LOG");
    logger.filter_level(level);

    #[cfg(unix)]
    logger.format(log_format_color);
    #[cfg(not(unix))]
    logger.format(log_format_no_color);

    logger.try_init().context("Failed to initialize logger")
}

#[cfg(unix)]
fn log_format_color(
    fmt: &mut env_logger::fmt::Formatter,
    record: &log::Record<'_>,
) -> io::Result<()> {
    let level = match record.level() {
        log::Level::Error => ansi_term::Color::Red.bold().paint("ERROR"),
        log::Level::Warn => ansi_term::Color::Yellow.bold().paint("WARN"),
        log::Level::Info => ansi_term::Color::Green.bold().paint("INFO"),
        log::Level::Debug => ansi_term::Color::Cyan.bold().paint("DBG"),
        log::Level::Trace => ansi_term::Color::Cyan.bold().paint("TRACE"),
    };

    writeln!(fmt, "[{}] - {}", level, record.args())
}

#[cfg(not(unix))]
fn log_format_no_color(
    fmt: &mut env_logger::fmt::Formatter,
    record: &log::Record<'_>,
) -> io::Result<()> {
    let level = match record.level() {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN",
        log::Level::Info => "INFO",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRACE",
    };

    writeln!(fmt, "[{}] - {}", level, record.args())
}
