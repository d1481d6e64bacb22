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

use anyhow::{Context, Result};
use clap::ArgMatches;

use xlsem::{Microscope, TiffOptions};

pub fn run(matches: &ArgMatches<'_>, scope: &mut Microscope) -> Result<()> {
    match matches.subcommand() {
        ("tiff", Some(m)) => {
            let path = m.value_of("PATH").unwrap();
            let options = TiffOptions {
                overwrite: m.is_present("overwrite"),
                databar: m.is_present("databar"),
                print_magnification: m.is_present("print-magnification"),
                graphics_bitplane: m.is_present("graphics-bitplane"),
            };

            log::info!("committing the current frame");
            scope.make_photo().context("failed to commit the frame buffer")?;

            log::info!("saving `{path}` on the microscope's control PC");
            scope
                .write_tiff_image(path, options)
                .with_context(|| format!("failed to save `{path}` on the device"))?;

            println!("saved `{path}` on the device; retrieve it over SMB");
        }
        (other, _) => unreachable!("unhandled `capture` subcommand `{other}`"),
    }

    Ok(())
}
