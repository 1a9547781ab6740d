use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    #[serde(default)]
    pub discord_token: String,
    #[serde(default)]
    pub guild_id: Option<u64>, // Restringe el registro de comandos a una guild

    // Lavalink
    #[serde(default = "default_lavalink_host")]
    pub lavalink_host: String,
    #[serde(default = "default_lavalink_port")]
    pub lavalink_port: u16,
    #[serde(default = "default_lavalink_password")]
    pub lavalink_password: String,
    #[serde(default)]
    pub lavalink_ssl: bool,

    // Audio
    #[serde(default = "default_volume")]
    pub default_volume: u16,
    #[serde(default = "default_queue_page_size")]
    pub queue_page_size: usize,

    // Paths
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_lavalink_host() -> String {
    "localhost".to_string()
}

fn default_lavalink_port() -> u16 {
    2333
}

fn default_lavalink_password() -> String {
    "youshallnotpass".to_string()
}

fn default_volume() -> u16 {
    30
}

fn default_queue_page_size() -> usize {
    10
}

fn default_data_dir() -> PathBuf {
    "./data".into()
}

impl Config {
    /// Loads the configuration from `.env` (if present) and the process environment.
    ///
    /// Variable names are the upper-case field names: `DISCORD_TOKEN`, `GUILD_ID`,
    /// `LAVALINK_HOST`, `LAVALINK_PORT`, `LAVALINK_PASSWORD`, `LAVALINK_SSL`,
    /// `DEFAULT_VOLUME`, `QUEUE_PAGE_SIZE` and `DATA_DIR`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Self = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token must be present
    /// - The Lavalink port must be non-zero
    /// - Volume must be between 0 and 1000 (Lavalink limit)
    /// - Queue page size must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must be set");
        }

        if self.lavalink_port == 0 {
            anyhow::bail!("Lavalink port must be greater than 0");
        }

        if self.default_volume > 1000 {
            anyhow::bail!(
                "Default volume must be between 0 and 1000, got: {}",
                self.default_volume
            );
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token and the Lavalink password are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary: Guild: {} | Lavalink: {}://{}:{} | Volume: {} | Queue page: {} | Data: {}",
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            if self.lavalink_ssl { "https" } else { "http" },
            self.lavalink_host,
            self.lavalink_port,
            self.default_volume,
            self.queue_page_size,
            self.data_dir.display(),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            lavalink_host: default_lavalink_host(),
            lavalink_port: default_lavalink_port(),
            lavalink_password: default_lavalink_password(),
            lavalink_ssl: false,

            default_volume: default_volume(),
            queue_page_size: default_queue_page_size(),

            data_dir: default_data_dir(),
        }
    }
}
