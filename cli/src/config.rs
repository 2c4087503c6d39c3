use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_AUTHOR: &str = "member";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    base_url: Option<String>,
    token: Option<String>,
    author: Option<String>,
}

pub struct Config {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub author: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "larder").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let config_path = proj_dirs.config_dir().join("config.toml");
        let file = read_file_config(&config_path)?;

        Ok(Self::resolve(
            data_dir.join("larder.db"),
            config_path,
            file,
            std::env::var("LARDER_URL").ok(),
            std::env::var("LARDER_TOKEN").ok(),
        ))
    }

    fn resolve(
        db_path: PathBuf,
        config_path: PathBuf,
        file: FileConfig,
        env_url: Option<String>,
        env_token: Option<String>,
    ) -> Self {
        Config {
            db_path,
            config_path,
            base_url: non_blank(env_url).or_else(|| non_blank(file.base_url)),
            token: non_blank(env_token).or_else(|| non_blank(file.token)),
            author: non_blank(file.author).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
        }
    }

    /// Fail early, with a pointer to the config file, when a command needs the backend.
    pub fn require_remote(&self) -> Result<()> {
        if self.base_url.is_none() || self.token.is_none() {
            anyhow::bail!(
                "Backend not configured. Set base_url and token in {} or LARDER_URL / LARDER_TOKEN",
                self.config_path.display()
            );
        }
        Ok(())
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
