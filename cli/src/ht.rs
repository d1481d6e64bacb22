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
use indicatif::{ProgressBar, ProgressStyle};

use xlsem::Microscope;

pub fn run(matches: &ArgMatches<'_>, scope: &mut Microscope) -> Result<()> {
    match matches.subcommand() {
        ("get", Some(_)) => {
            let enabled = scope.is_hightension_enabled().context("couldn't read HT enabled state")?;
            if !enabled {
                println!("off");
                return Ok(());
            }
            let volts = scope.get_hightension().context("couldn't read HT value")?;
            println!("{volts:.1} V");
        }
        ("set", Some(m)) => {
            let volts: f32 = m
                .value_of("VOLTS")
                .unwrap()
                .parse()
                .context("VOLTS must be a number")?;

            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}"));
            pb.enable_steady_tick(120);
            pb.set_message(if volts == 0.0 {
                "disabling high tension...".to_string()
            } else {
                format!("ramping high tension to {volts:.1} V...")
            });

            let ok = scope.set_hightension(volts).context("failed to set high tension")?;
            pb.finish_and_clear();

            if !ok {
                bail!("device refused to enable high tension");
            }
            println!("ok");
        }
        (other, _) => unreachable!("unhandled `ht` subcommand `{other}`"),
    }

    Ok(())
}
