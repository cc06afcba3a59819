//! Implementation of the `homr init` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::adapters::sqlite::{database_url, initialize_database};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::HomrConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub config_path: PathBuf,
    pub config_written: bool,
    pub database_path: PathBuf,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("Configuration written to {}", self.config_path.display()));
        }
        lines.push(format!("Database ready at {}", self.database_path.display()));
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, config: &HomrConfig, json_mode: bool) -> Result<()> {
    let target = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };

    let homr_dir = target.join(".homr");
    fs::create_dir_all(&homr_dir)
        .await
        .with_context(|| format!("Failed to create {}", homr_dir.display()))?;

    let config_path = homr_dir.join("config.yaml");
    let config_written = if args.force || !config_path.exists() {
        let yaml = serde_yaml::to_string(&HomrConfig::default()).context("Failed to render default config")?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    } else {
        false
    };

    let database_path = resolve_database_path(&target, &config.database.path);
    let pool = initialize_database(&database_url(&database_path.to_string_lossy()), None)
        .await
        .context("Failed to initialize database")?;
    pool.close().await;

    let out = InitOutput {
        success: true,
        message: if config_written {
            "Project initialized.".to_string()
        } else {
            "Project already initialized; kept existing configuration. Use --force to overwrite.".to_string()
        },
        config_path,
        config_written,
        database_path,
    };
    output(&out, json_mode);
    Ok(())
}

fn resolve_database_path(target: &Path, configured: &str) -> PathBuf {
    let configured = Path::new(configured);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        target.join(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_writes_config_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let args = InitArgs {
            force: false,
            path: dir.path().to_path_buf(),
        };
        execute(args, &HomrConfig::default(), true).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join(".homr/config.yaml")).unwrap();
        let parsed: HomrConfig = serde_yaml::from_str(&written).unwrap();
        assert_eq!(parsed.database.path, ".homr/homr.db");
        assert!(dir.path().join(".homr/homr.db").exists());
    }

    #[tokio::test]
    async fn test_init_keeps_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".homr")).unwrap();
        std::fs::write(dir.path().join(".homr/config.yaml"), "logging:\n  level: debug\n").unwrap();

        let args = InitArgs {
            force: false,
            path: dir.path().to_path_buf(),
        };
        execute(args, &HomrConfig::default(), true).await.unwrap();

        let kept = std::fs::read_to_string(dir.path().join(".homr/config.yaml")).unwrap();
        assert!(kept.contains("debug"));
    }
}
