//! hbnb console entry point.
//!
//! # Responsibility
//! - Parse startup flags and initialize optional file logging.
//! - Open the record store once and hand it to the console loop.

mod console;

use clap::Parser;
use console::Console;
use hbnb_core::{
    core_version, default_log_level, init_logging, ConsoleService, JsonFileStore, KindCatalog,
    DEFAULT_STORE_FILE,
};
use log::info;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "hbnb")]
#[command(about = "Line console over the hbnb JSON record store")]
#[command(version)]
struct Cli {
    /// JSON snapshot file holding every record
    #[arg(long, default_value = DEFAULT_STORE_FILE)]
    file: PathBuf,

    /// Log level: trace|debug|info|warn|error (needs --log-dir)
    #[arg(long, requires = "log_dir")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files (logging is off when omitted)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("hbnb: logging disabled: {err}");
        }
    }
    info!(
        "event=cli_start module=cli status=ok core_version={} file={}",
        core_version(),
        cli.file.display()
    );

    let store = match JsonFileStore::open(&cli.file, KindCatalog::builtin()) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("hbnb: cannot load store: {err}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut console = Console::new(ConsoleService::new(store), stdin.lock(), io::stdout().lock())
        .with_prompt(interactive);

    match console.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("hbnb: console I/O failed: {err}");
            ExitCode::FAILURE
        }
    }
}
