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
use indicatif::{ProgressBar, ProgressStyle};

use xlsem::Microscope;

use crate::opt_f32;

pub fn run(matches: &ArgMatches<'_>, scope: &mut Microscope) -> Result<()> {
    match matches.subcommand() {
        ("get", Some(_)) => {
            let pos = scope.get_stage_position().context("couldn't read the stage position")?;
            println!(
                "x={:.4}mm y={:.4}mm z={:.4}mm tilt={:.2}deg rot={:.2}deg",
                pos.x, pos.y, pos.z, pos.tilt, pos.rot
            );
        }
        ("home", Some(_)) => {
            let pb = spinner("homing the stage (this can take minutes)...");
            let result = scope.stage_home();
            pb.finish_and_clear();
            result.context("failed to home the stage")?;
            println!("ok");
        }
        ("move", Some(m)) => {
            let x = opt_f32(m, "x")?;
            let y = opt_f32(m, "y")?;
            let z = opt_f32(m, "z")?;
            let tilt = opt_f32(m, "tilt")?;
            let rot = opt_f32(m, "rot")?;

            let pb = spinner("moving the stage...");
            let result = scope.set_stage_position(x, y, z, tilt, rot);
            pb.finish_and_clear();
            result.context("failed to move the stage")?;
            println!("ok");
        }
        (other, _) => unreachable!("unhandled `stage` subcommand `{other}`"),
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}"));
    pb.enable_steady_tick(120);
    pb.set_message(message.to_string());
    pb
}
