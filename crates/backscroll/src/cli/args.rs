use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drive the chat pager against a simulated message store.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Pager config file (defaults to ~/.config/backscroll/pager.toml)
    #[arg(long, env = "BACKSCROLL_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Seed a chat in memory and scroll through it, printing the view after each step
    Simulate {
        /// Messages to seed
        #[arg(long, default_value = "1000")]
        messages: usize,

        /// How many of the newest messages start out unread
        #[arg(long, default_value = "0")]
        unread: usize,

        /// Viewport height in pixels
        #[arg(long, default_value = "600")]
        viewport: u32,

        /// Entries per page (overrides the config file)
        #[arg(long)]
        page_size: Option<usize>,

        /// Viewports to scroll up before mutating the chat
        #[arg(long, default_value = "10")]
        steps: usize,
    },
    /// Manage the pager config file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective config
    Show,
    /// Print the config file location
    Path,
    /// Remove the config file so defaults apply
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_with_overrides() {
        let cli = Cli::try_parse_from([
            "backscroll",
            "--debug",
            "simulate",
            "--messages",
            "50",
            "--unread",
            "5",
            "--page-size",
            "10",
        ])
        .unwrap();

        assert!(cli.debug);
        let Commands::Simulate {
            messages,
            unread,
            viewport,
            page_size,
            steps,
        } = cli.command
        else {
            panic!("expected simulate");
        };
        assert_eq!((messages, unread, viewport), (50, 5, 600));
        assert_eq!(page_size, Some(10));
        assert_eq!(steps, 10);
    }

    #[test]
    fn parses_config_subcommands() {
        let cli = Cli::try_parse_from(["backscroll", "--config", "/tmp/p.toml", "config", "path"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigCommands::Path
            }
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["backscroll"]).is_err());
    }
}
