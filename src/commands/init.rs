//! Init command implementation

use crate::config::{render_config_toml, Config};
use crate::db::Database;
use crate::engine::Engine;
use crate::error::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    /// Replace an existing config file with the defaults
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub config_path: PathBuf,
    pub config_written: bool,
    pub db_path: PathBuf,
    pub index_files_created: Vec<PathBuf>,
}

/// Write a config file if needed, create the database, and create an empty
/// ANN file for every configured model that lacks one.
///
/// An existing config is kept unless `force` is set, so rerunning `init`
/// after adding models to the config only creates the missing index files.
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    let (config, config_written) = if config_path.exists() && !force {
        info!("Using existing config at {:?}", config_path);
        (Config::load(&config_path)?, false)
    } else {
        let mut config = Config::default();
        config.init_paths(base_dir, config_path.clone());
        config.validate()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, render_config_toml(&config)?)?;
        info!("Created config at {:?}", config_path);
        (config, true)
    };

    let db = Database::connect(
        &config.paths.db_file,
        Duration::from_secs(config.busy_timeout_secs),
    )
    .await?;
    db.close().await;
    info!("Database ready at {:?}", config.paths.db_file);

    std::fs::create_dir_all(&config.paths.index_dir)?;
    let index_files_created = Engine::init_indexes(&config)?;

    Ok(InitReport {
        config_path,
        config_written,
        db_path: config.paths.db_file.clone(),
        index_files_created,
    })
}

pub fn print_init_report(report: &InitReport) {
    if report.config_written {
        println!("✓ Wrote config to {}", report.config_path.display());
    } else {
        println!("✓ Using existing config at {}", report.config_path.display());
    }
    println!("Database: {}", report.db_path.display());
    for path in &report.index_files_created {
        println!("Created index file: {}", path.display());
    }
    println!("\nNext steps:");
    println!("  add embedding models to the config, then rerun `chunkvault init`");
    println!("  chunkvault add my-doc --text \"some text\"");
    println!("  chunkvault search \"some\"");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingModelConfig;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
        }
    }

    #[tokio::test]
    async fn test_init_creates_config_and_db() {
        let tmp = TempDir::new().unwrap();
        let report = cmd_init(options(&tmp, false)).await.unwrap();

        assert!(report.config_written);
        assert!(report.config_path.exists());
        assert!(report.db_path.exists());
        assert!(report.index_files_created.is_empty());

        let config = Config::load(&report.config_path).unwrap();
        assert!(config.embedding_models.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_keeps_config_and_creates_index_files() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false)).await.unwrap();

        let mut config = Config::load(&tmp.path().join("config.toml")).unwrap();
        config.embedding_models.push(EmbeddingModelConfig {
            id: "mini".to_string(),
            provider: "ollama".to_string(),
            timeout_secs: 5,
            options: toml::Table::new(),
        });
        config.save().unwrap();

        let report = cmd_init(options(&tmp, false)).await.unwrap();
        assert!(!report.config_written);
        assert_eq!(report.index_files_created, vec![config.index_file("mini")]);
        assert!(config.index_file("mini").exists());

        // --force resets to the defaults
        let report = cmd_init(options(&tmp, true)).await.unwrap();
        assert!(report.config_written);
        let config = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert!(config.embedding_models.is_empty());
    }
}
