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

use anyhow::{bail, Context, Result};
use clap::ArgMatches;

use xlsem::{Microscope, ScanMode};

fn parse_mode(s: &str) -> Result<ScanMode> {
    Ok(match s {
        "full-frame" => ScanMode::FullFrame,
        "selected-area" => ScanMode::SelectedArea,
        "spot" => ScanMode::Spot,
        "line-x" => ScanMode::LineX,
        "line-y" => ScanMode::LineY,
        "ext-xy" => ScanMode::ExtXy,
        other => bail!(
            "unknown scan mode `{other}`, expected one of: full-frame, selected-area, spot, line-x, line-y, ext-xy"
        ),
    })
}

pub fn run(matches: &ArgMatches<'_>, scope: &mut Microscope) -> Result<()> {
    match matches.subcommand() {
        ("get", Some(_)) => {
            let mode = scope.get_scanmode().context("couldn't read the scan mode")?;
            println!("{mode:?}");
        }
        ("set", Some(m)) => {
            let mode = parse_mode(m.value_of("MODE").unwrap())?;
            scope.set_scanmode(mode).context("failed to set the scan mode")?;
            println!("ok");
        }
        (other, _) => unreachable!("unhandled `scan-mode` subcommand `{other}`"),
    }

    Ok(())
}
