//! voxl-deploy CLI
//!
//! Entry point for the `voxl-deploy` command-line tool.

use clap::Parser;
use std::process;

use voxl_deploy::{Command, Orchestrator, Settings, SystemRunner, HELP};

#[derive(Parser)]
#[command(name = "voxl-deploy")]
#[command(about = "Build and deploy the VOXL docker payload", version)]
struct Cli {
    /// Operation to run (see `voxl-deploy help`)
    command: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    // A missing or unrecognized token shows the menu and is not an error.
    let token = cli.command.as_deref().unwrap_or("help");
    let Some(command) = Command::parse(token) else {
        println!("{}", HELP);
        return;
    };
    if command == Command::Help {
        println!("{}", HELP);
        return;
    }

    let root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: cannot determine working directory: {}", e);
            process::exit(1);
        }
    };

    let settings = match Settings::resolve(&root) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let runner = SystemRunner;
    let orchestrator = Orchestrator::new(&settings, &root, &runner);

    if let Err(e) = orchestrator.run(command) {
        eprintln!("error: {}", e);
        process::exit(e.exit_code());
    }
}
