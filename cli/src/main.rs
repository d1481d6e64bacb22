// Copyright 2024 SEM Driver Contributors
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
use clap::{crate_authors, crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};

use xlsem::{CapabilityRanges, Config, Microscope};

mod capture;
mod detector;
mod ht;
mod list;
mod scanmode;
mod stage;

#[cfg(unix)]
const DEFAULT_PORT: &str = "/dev/ttyUSB0";
#[cfg(windows)]
const DEFAULT_PORT: &str = "COM1";

fn main() -> Result<()> {
    let app = App::new("XL-series SEM driver")
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(crate_version!())
        .author(crate_authors!())
        .about("Diagnostic CLI for the Philips/FEI XL-series SEM protocol driver")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .default_value(DEFAULT_PORT)
                .help("Serial port the microscope is connected to"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity, -v (debug), -vv (trace)"),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("List available serial ports"),
        )
        .subcommand(
            SubCommand::with_name("id")
                .about("Connect and print the machine type and serial number"),
        )
        .subcommand(
            SubCommand::with_name("ht")
                .about("Read or set the high tension (accelerating voltage)")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("get").about("Print the current high tension in volts"))
                .subcommand(
                    SubCommand::with_name("set")
                        .about("Set the high tension; 0 disables it")
                        .arg(Arg::with_name("VOLTS").required(true).help("Target voltage, or 0 to disable")),
                ),
        )
        .subcommand(
            SubCommand::with_name("detector")
                .about("Inspect or select the active detector")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("get").about("Print the currently selected detector"))
                .subcommand(
                    SubCommand::with_name("set")
                        .about("Select a detector by catalogue id")
                        .arg(Arg::with_name("ID").required(true).help("Detector catalogue id")),
                )
                .subcommand(SubCommand::with_name("list").about("Print the fixed detector catalogue")),
        )
        .subcommand(
            SubCommand::with_name("scan-mode")
                .about("Read or set the electron-beam scan mode")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("get").about("Print the current scan mode"))
                .subcommand(
                    SubCommand::with_name("set")
                        .about("Set the scan mode")
                        .arg(
                            Arg::with_name("MODE")
                                .required(true)
                                .help("One of: full-frame, selected-area, spot, line-x, line-y, ext-xy"),
                        ),
                ),
        )
        .subcommand(
            SubCommand::with_name("stage")
                .about("Read the stage position, home it, or move it")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("get").about("Print the current stage position"))
                .subcommand(SubCommand::with_name("home").about("Home the stage (can take minutes)"))
                .subcommand(
                    SubCommand::with_name("move")
                        .about("Move the stage; omitted axes are left unchanged")
                        .arg(Arg::with_name("x").long("x").takes_value(true).help("X position, mm"))
                        .arg(Arg::with_name("y").long("y").takes_value(true).help("Y position, mm"))
                        .arg(Arg::with_name("z").long("z").takes_value(true).help("Z position, mm"))
                        .arg(Arg::with_name("tilt").long("tilt").takes_value(true).help("Tilt, degrees"))
                        .arg(Arg::with_name("rot").long("rot").takes_value(true).help("Rotation, degrees")),
                ),
        )
        .subcommand(
            SubCommand::with_name("capture")
                .about("Commit the current frame and save it as a TIFF on the device")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("tiff")
                        .about("Commit the frame buffer and save it at an absolute device-side path")
                        .arg(Arg::with_name("PATH").required(true).help(
                            "Absolute path on the microscope's control PC, e.g. C:\\XL\\USR\\IMG.TIF",
                        ))
                        .arg(Arg::with_name("overwrite").long("overwrite").help("Overwrite an existing file"))
                        .arg(Arg::with_name("databar").long("databar").help("Burn in the databar overlay"))
                        .arg(
                            Arg::with_name("print-magnification")
                                .long("print-magnification")
                                .help("Burn in the magnification readout"),
                        )
                        .arg(
                            Arg::with_name("graphics-bitplane")
                                .long("graphics-bitplane")
                                .help("Include the graphics bit plane"),
                        ),
                ),
        );

    let matches = app.get_matches();

    init_logger(match matches.occurrences_of("v") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        2..=u64::MAX => log::LevelFilter::Trace,
    })?;

    if let ("list", Some(_)) = matches.subcommand() {
        return list::list();
    }

    let port = matches.value_of("port").unwrap();
    log::info!("using port `{port}`");

    let mut scope = Microscope::new(port, CapabilityRanges::xl30(), Config::default())
        .context("failed to construct the session")?;
    scope.connect().with_context(|| format!("couldn't connect to `{port}`"))?;

    if let Some(id) = scope.machine_type().zip(scope.machine_serial()) {
        log::info!("connected to {:?} serial #{}", id.0, id.1);
    }

    match matches.subcommand() {
        ("id", Some(_)) => {
            println!("{:?} serial #{}", scope.machine_type().unwrap(), scope.machine_serial().unwrap());
        }
        ("ht", Some(m)) => ht::run(m, &mut scope)?,
        ("detector", Some(m)) => detector::run(m, &mut scope)?,
        ("scan-mode", Some(m)) => scanmode::run(m, &mut scope)?,
        ("stage", Some(m)) => stage::run(m, &mut scope)?,
        ("capture", Some(m)) => capture::run(m, &mut scope)?,
        (other, _) => unreachable!("unhandled subcommand `{other}`"),
    }

    Ok(())
}

/// Parse a value shared across several subcommands: `Option<f32>` that is
/// only `Some` when the caller actually passed `--flag`.
pub(crate) fn opt_f32(matches: &ArgMatches<'_>, name: &str) -> Result<Option<f32>> {
    matches
        .value_of(name)
        .map(|v| v.parse::<f32>().with_context(|| format!("`--{name}` must be a number")))
        .transpose()
}

fn init_logger(level: log::LevelFilter) -> Result<()> {
    let mut logger = env_logger::Builder::from_env("XLSEM_LOG");
    logger.filter_level(level);

    #[cfg(unix)]
    logger.format(log_format_color);
    #[cfg(not(unix))]
    logger.format(log_format_no_color);

    logger.try_init().context("failed to initialize logger")
}

#[cfg(unix)]
fn log_format_color(fmt: &mut env_logger::fmt::Formatter, record: &log::Record<'_>) -> io::Result<()> {
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
fn log_format_no_color(fmt: &mut env_logger::fmt::Formatter, record: &log::Record<'_>) -> io::Result<()> {
    let level = match record.level() {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN",
        log::Level::Info => "INFO",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRACE",
    };

    writeln!(fmt, "[{}] - {}", level, record.args())
}
