//! Reveille daemon: runs the alarm and timer schedulers and reads commands
//! from stdin.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use clap::Parser;
use reveille::app::App;
use reveille::command::{self, CommandOutcome};
use reveille::persistence::ConfigStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reveille")]
#[command(author, version, about = "Headless alarm clock", long_about = None)]
struct Cli {
    /// Config database (defaults to the per-user data directory)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Show desktop notifications
    #[arg(long)]
    notify: bool,

    /// Start the sleep timer right away
    #[arg(long, value_name = "MINUTES")]
    sleep: Option<u32>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store = match &cli.db {
        Some(path) => ConfigStore::open(path)?,
        None => ConfigStore::new()?,
    };
    let app = App::new(store, cli.notify)?;
    app.start()?;

    if let Some(minutes) = cli.sleep {
        app.start_sleep_timer(minutes)?;
    }

    for line in io::stdin().lock().lines() {
        match command::handle_command(&app, &line?) {
            Ok(CommandOutcome::Reply(text)) if text.is_empty() => {}
            Ok(CommandOutcome::Reply(text)) => println!("{text}"),
            Ok(CommandOutcome::Quit) => {
                app.shutdown()?;
                return Ok(());
            }
            Err(e) => println!("error: {e}"),
        }
    }

    // No console attached; keep ringing alarms until the process is killed.
    info!("stdin closed, running until terminated");
    loop {
        thread::park();
    }
}
