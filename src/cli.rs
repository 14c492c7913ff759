use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::remote::DEFAULT_PORT;

/// Record shell command sequences as macros and replay them.
///
/// Any unknown command is treated as a macro name: `tm deploy staging`
/// is the same as `tm exec deploy staging`.
#[derive(Parser, Debug)]
#[command(name = "tm", version, about)]
pub struct Cli {
    /// Print debug diagnostics to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start recording a new macro
    New { name: String },

    /// Finish the current recording and save the macro
    Save,

    /// Abort the current recording
    Cancel,

    /// Execute a saved macro
    Exec {
        name: String,
        /// Values for {1}, {2}, ... placeholders
        params: Vec<String>,
        /// Run every command with administrator privileges
        #[arg(long)]
        admin: bool,
    },

    /// Execute a macro on a remote machine via SSH
    Remote {
        name: String,
        /// Values for {1}, {2}, ... placeholders
        params: Vec<String>,
        /// Remote host, optionally as user@host
        #[arg(short = 'H', long)]
        host: String,
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Path to the SSH private key
        #[arg(short, long)]
        key: Option<PathBuf>,
        /// Password for SSH authentication
        #[arg(short = 'P', long)]
        password: Option<String>,
    },

    /// Search for a macro by keyword
    Find {
        keyword: String,
        /// Search command bodies instead of macro names
        #[arg(long)]
        content: bool,
    },

    /// Show the commands of a macro
    Desc {
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// List available macros
    Ls,

    /// Delete a saved macro by name
    Del {
        name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Edit a saved macro by name
    Edit {
        name: String,
        /// Open the macro in $VISUAL / $EDITOR instead of the menu
        #[arg(short, long)]
        external: bool,
    },

    #[command(external_subcommand)]
    Run(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_with_params_and_admin() {
        let cli = Cli::parse_from(["tm", "exec", "deploy", "staging", "eu", "--admin"]);
        match cli.command {
            Command::Exec {
                name,
                params,
                admin,
            } => {
                assert_eq!(name, "deploy");
                assert_eq!(params, vec!["staging", "eu"]);
                assert!(admin);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_is_macro_name() {
        let cli = Cli::parse_from(["tm", "deploy", "staging"]);
        match cli.command {
            Command::Run(args) => assert_eq!(args, vec!["deploy", "staging"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_remote_options() {
        let cli = Cli::parse_from([
            "tm", "remote", "deploy", "v2", "-H", "ops@web-1", "-p", "2222", "-k", "/id_ed25519",
        ]);
        match cli.command {
            Command::Remote {
                host,
                port,
                key,
                password,
                params,
                ..
            } => {
                assert_eq!(host, "ops@web-1");
                assert_eq!(port, 2222);
                assert_eq!(key, Some(PathBuf::from("/id_ed25519")));
                assert!(password.is_none());
                assert_eq!(params, vec!["v2"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
