mod cli;
mod diff;
mod dispatch;
mod editor;
mod error;
mod history;
mod logging;
mod manager;
mod params;
mod recording;
mod remote;
mod settings;
mod store;

use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Command};
use dispatch::ExecutionMode;
use error::{MacroError, Result};
use history::HistoryFile;
use logging::{init_logging, LogConfig};
use manager::{EditMode, MacroManager};
use recording::HeadFile;
use remote::SshConnector;
use settings::{first_run_guide, Paths, Settings};
use store::JsonFileStore;

fn run(cli: Cli) -> Result<()> {
    let paths = Paths::resolve()?;
    let mut settings = Settings::load(&paths.settings())?;

    first_run_guide(&mut settings, &paths.settings(), &mut io::stderr().lock())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut manager = MacroManager::new(
        JsonFileStore::new(paths.macros()),
        HeadFile::new(paths.head()),
    );
    let stdin = io::stdin();
    let mut input = stdin.lock();

    match cli.command {
        Command::New { name } => manager.new_recording(&name, &mut out),
        Command::Save => {
            let history = HistoryFile::new(settings.history_path(&paths));
            manager.save_recording(&history, &mut out).map(|_| ())
        }
        Command::Cancel => manager.cancel_recording(&mut out),
        Command::Exec {
            name,
            params,
            admin,
        } => {
            let mode = if admin {
                ExecutionMode::Elevated
            } else {
                ExecutionMode::Local
            };
            manager.exec(&name, &params, mode, &SshConnector, &mut out)
        }
        Command::Run(mut args) => {
            if args.is_empty() {
                return Ok(());
            }
            let name = args.remove(0);
            let admin = args.iter().any(|a| a == "--admin");
            args.retain(|a| a != "--admin");
            let mode = if admin {
                ExecutionMode::Elevated
            } else {
                ExecutionMode::Local
            };
            manager.exec(&name, &args, mode, &SshConnector, &mut out)
        }
        Command::Remote {
            name,
            params,
            host,
            port,
            key,
            password,
        } => manager.remote(
            &name,
            &params,
            &host,
            port,
            key,
            password,
            &SshConnector,
            &mut out,
        ),
        Command::Find { keyword, content } => manager.find(&keyword, content, &mut out).map(|_| ()),
        Command::Desc { name, json } => manager.describe(&name, json, &mut out),
        Command::Ls => manager.list(&mut out).map(|_| ()),
        Command::Del { name, yes } => manager
            .delete(&name, yes, &mut input, &mut out)
            .map(|_| ()),
        Command::Edit { name, external } => {
            let editor_command = settings.editor_command();
            let mode = if external {
                EditMode::External(&editor_command)
            } else {
                EditMode::Menu
            };
            manager.edit(&name, mode, &mut input, &mut out).map(|_| ())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose));

    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

fn report_error(err: &MacroError) -> ExitCode {
    tracing::debug!(kind = err.kind(), error = ?err, "Command failed");
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "{}", format!("Error: {err}").red());
    if let Some(hint) = err.hint() {
        let _ = writeln!(stderr, "{}", format!("NOTE: {hint}").blue());
    }
    ExitCode::FAILURE
}
