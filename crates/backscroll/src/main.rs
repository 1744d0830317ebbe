use backscroll::cli::{Cli, Commands, ConfigCommands};
use backscroll::commands::{
    Command,
    config::{ConfigAction, ConfigCommand},
    simulate::SimulateCommand,
};
use backscroll_core::PagerConfig;
use clap::Parser;
use eyre::Result;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    backscroll::init_tracing(cli.debug)?;

    match cli.command {
        Commands::Simulate {
            messages,
            unread,
            viewport,
            page_size,
            steps,
        } => {
            let mut config = match &cli.config {
                Some(path) => PagerConfig::load_from(path)?,
                None => PagerConfig::load()?,
            };
            if let Some(page_size) = page_size {
                config.page_size = page_size;
            }
            debug!("Pager config: {:?}", config);

            let command = SimulateCommand {
                messages,
                unread,
                viewport,
                steps,
                config,
            };
            command.execute().await
        }
        Commands::Config { action } => {
            let action = match action {
                ConfigCommands::Show => ConfigAction::Show,
                ConfigCommands::Path => ConfigAction::Path,
                ConfigCommands::Reset => ConfigAction::Reset,
            };
            let command = ConfigCommand {
                action,
                path: cli.config,
            };
            command.execute().await
        }
    }
}
