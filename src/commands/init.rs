//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::store::open_index;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Starter example corpus written on first init
const BUNDLED_EXAMPLES: &str = include_str!("../../data/sql_train.json");

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub base_dir: String,
    pub config_path: String,
    pub db_path: String,
    pub examples_path: String,
    pub examples_written: bool,
    pub index_reachable: bool,
}

/// Initialize sqlingo configuration, metadata database and starter corpus
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized(config_path.display().to_string()));
    }

    let mut config = Config::default();
    config.paths.base_dir = base_dir.clone();
    config.paths.config_file = config_path.clone();
    config.paths.db_file = base_dir.join("metadata.db");
    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    let examples_path = config.examples_path();
    let examples_written = if examples_path.exists() {
        false
    } else {
        std::fs::write(&examples_path, BUNDLED_EXAMPLES)?;
        info!("Wrote starter example corpus to {:?}", examples_path);
        true
    };

    let index_reachable = match open_index(&config).await {
        Ok(index) => match index.list_collections().await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "Could not reach the vector index at {}: {}. Make sure Qdrant is running.",
                    config.qdrant_url, e
                );
                false
            }
        },
        Err(e) => {
            warn!("Could not open the vector index: {}", e);
            false
        }
    };

    Ok(InitReport {
        base_dir: base_dir.display().to_string(),
        config_path: config_path.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        examples_path: examples_path.display().to_string(),
        examples_written,
        index_reachable,
    })
}

pub fn print_init(report: &InitReport) {
    println!("✓ Initialized sqlingo at {}", report.base_dir);
    println!("\nConfiguration: {}", report.config_path);
    println!("Database: {}", report.db_path);
    if report.examples_written {
        println!("Example corpus: {} (starter set)", report.examples_path);
    } else {
        println!("Example corpus: {} (kept existing)", report.examples_path);
    }
    if !report.index_reachable {
        println!("\n⚠️  Vector index not reachable. Start Qdrant: docker run -p 6334:6334 qdrant/qdrant");
    }
    println!("\nNext steps:");
    println!("  sqlingo examples load                                # Index the example corpus");
    println!("  sqlingo register acme --url mysql://user@host/shop   # Register a tenant");
    println!("  sqlingo query acme \"customers with no orders\"        # Ask a question");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::load_corpus;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
        }
    }

    #[test]
    fn test_bundled_corpus_parses() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sql_train.json");
        std::fs::write(&path, BUNDLED_EXAMPLES).unwrap();
        assert!(!load_corpus(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_creates_files() {
        let tmp = TempDir::new().unwrap();
        let report = cmd_init(options(&tmp, false)).await.unwrap();

        assert!(report.examples_written);
        assert!(tmp.path().join("config.toml").exists());
        assert!(tmp.path().join("metadata.db").exists());
        assert!(tmp.path().join("sql_train.json").exists());

        let config = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.paths.base_dir, tmp.path());
    }

    #[tokio::test]
    async fn test_init_refuses_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false)).await.unwrap();

        assert!(matches!(
            cmd_init(options(&tmp, false)).await,
            Err(Error::AlreadyInitialized(_))
        ));

        let again = cmd_init(options(&tmp, true)).await.unwrap();
        assert!(!again.examples_written);
    }
}
