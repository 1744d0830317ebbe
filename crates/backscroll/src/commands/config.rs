use super::Command;
use crate::error::Error;
use async_trait::async_trait;
use backscroll_core::PagerConfig;
use eyre::Result;
use std::io::Write;
use std::path::PathBuf;

pub struct ConfigCommand {
    pub action: ConfigAction,
    /// Explicit config file; the per-user default otherwise
    pub path: Option<PathBuf>,
}

pub enum ConfigAction {
    Show,
    Path,
    Reset,
}

#[async_trait]
impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.run(&mut stdout).map_err(Into::into)
    }
}

impl ConfigCommand {
    fn resolve_path(&self) -> std::result::Result<PathBuf, Error> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(PagerConfig::config_path()?),
        }
    }

    pub fn run(&self, out: &mut impl Write) -> std::result::Result<(), Error> {
        let path = self.resolve_path()?;
        match self.action {
            ConfigAction::Show => {
                let config = PagerConfig::load_from(&path)?;
                writeln!(out, "Config file: {}", path.display())?;
                writeln!(out, "\n{}", toml::to_string_pretty(&config)?)?;
            }
            ConfigAction::Path => writeln!(out, "{}", path.display())?,
            ConfigAction::Reset => {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                    writeln!(out, "Config reset to defaults")?;
                } else {
                    writeln!(out, "No config file found")?;
                }
            }
        }
        Ok(())
    }
}
