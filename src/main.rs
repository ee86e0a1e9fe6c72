// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{error::Error, fs, path::PathBuf};

use clap::{crate_version, Parser, Subcommand};
use snapblaster::{
    config::Snapblaster,
    controller::Model,
    license::License,
    midi,
    project::Project,
    runtime::Runtime,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Snap recall and morphing for grid MIDI controllers."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts a performance session.
    Start {
        /// The path to the snapblaster configuration file.
        config_path: String,

        /// A project file (JSON) to perform. Starts with an empty project when omitted.
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Lists the available MIDI input/output devices.
    MidiDevices {},
    /// Lists the supported grid controllers and their default ports.
    Controllers {},
    /// Prints an empty project as JSON, for use as a starting point.
    NewProject {
        /// The project name.
        #[arg(default_value = "New Project")]
        name: String,

        /// How many banks to create. Extra banks need the pro license.
        #[arg(short, long, default_value_t = 1)]
        banks: usize,
    },
}

/// Loads the project file. Without one, a project with every licensed bank is created.
fn load_project(path: Option<String>, license: &License) -> Result<Project, Box<dyn Error>> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(PathBuf::from(&path))?;
            serde_json::from_str(&contents)
                .map_err(|e| format!("error parsing project {}: {}", path, e).into())
        }
        None => Ok(Project::for_license("New Project", license)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config_path,
            project,
        } => {
            let config = Snapblaster::deserialize(&PathBuf::from(config_path))?;
            let project = load_project(project, &config.license())?;
            Runtime::start(&config, project)?.join().await;
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Controllers {} => {
            println!("Controllers:");
            for model in Model::ALL {
                println!("- {} (default port: {})", model, model.default_port());
            }
        }
        Commands::NewProject { name, banks } => {
            println!("{}", serde_json::to_string_pretty(&Project::new(&name, banks))?);
        }
    }

    Ok(())
}
