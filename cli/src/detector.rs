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

use xlsem::{Microscope, DETECTOR_CATALOGUE};

pub fn run(matches: &ArgMatches<'_>, scope: &mut Microscope) -> Result<()> {
    match matches.subcommand() {
        ("get", Some(_)) => {
            let reading = scope.get_detector().context("couldn't read the active detector")?;
            let name = DETECTOR_CATALOGUE
                .iter()
                .find(|d| d.id == reading.id)
                .map(|d| d.name)
                .unwrap_or("unknown");
            println!("id {} ({}), raw type {}", reading.id, name, reading.detector_type);
        }
        ("set", Some(m)) => {
            let id: u16 = m.value_of("ID").unwrap().parse().context("ID must be a number")?;
            let ok = scope.set_detector(id).context("failed to select detector")?;
            if !ok {
                bail!("device did not acknowledge the detector switch");
            }
            println!("ok");
        }
        ("list", Some(_)) => {
            for entry in DETECTOR_CATALOGUE {
                println!(
                    "{:>4}  {:<40} {}",
                    entry.id,
                    entry.name,
                    entry.short_name.unwrap_or("-")
                );
            }
        }
        (other, _) => unreachable!("unhandled `detector` subcommand `{other}`"),
    }

    Ok(())
}
