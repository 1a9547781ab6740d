use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use crate::cache::{BindingKey, ReactionRoleBinding};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt binding data: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable key-value store behind the reaction-role cache.
///
/// Each call is atomic on its own; nothing spans calls.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Full scan, used once at startup.
    async fn load_all(&self) -> Result<Vec<ReactionRoleBinding>, StoreError>;

    async fn get(&self, key: &BindingKey) -> Result<Option<ReactionRoleBinding>, StoreError>;

    /// Inserts or replaces the binding stored under its key.
    async fn upsert(&self, binding: &ReactionRoleBinding) -> Result<(), StoreError>;

    /// Returns whether a binding was deleted.
    async fn delete(&self, key: &BindingKey) -> Result<bool, StoreError>;

    /// Deletes every binding of the guild, returning how many were stored.
    async fn delete_guild(&self, guild: GuildId) -> Result<usize, StoreError>;
}

/// Bindings stored as one JSON file per guild under `<data_dir>/reaction_roles`.
pub struct JsonBindingStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on the guild files.
    lock: Mutex<()>,
}

impl JsonBindingStore {
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = data_dir.as_ref().join("reaction_roles");
        fs::create_dir_all(&dir).await?;

        info!("📁 Reaction role storage at: {}", dir.display());

        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn guild_path(&self, guild: GuildId) -> PathBuf {
        self.dir.join(format!("guild_{}.json", guild))
    }

    async fn read_guild(&self, guild: GuildId) -> Result<Vec<ReactionRoleBinding>, StoreError> {
        match fs::read_to_string(self.guild_path(guild)).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_guild(
        &self,
        guild: GuildId,
        bindings: &[ReactionRoleBinding],
    ) -> Result<(), StoreError> {
        let path = self.guild_path(guild);

        if bindings.is_empty() {
            return match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        // Write then rename so a crash never leaves a half-written file behind.
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(bindings)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl BindingStore for JsonBindingStore {
    async fn load_all(&self) -> Result<Vec<ReactionRoleBinding>, StoreError> {
        let _guard = self.lock.lock().await;

        let mut files = fs::read_dir(&self.dir).await?;
        let mut bindings = Vec::new();
        let mut guilds = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let guild = path
                .file_stem()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
                .filter(|id| *id != 0)
                .map(GuildId::new);

            let Some(guild) = guild else {
                debug!("Skipping unrelated file {}", path.display());
                continue;
            };

            match self.read_guild(guild).await {
                Ok(loaded) => {
                    guilds += 1;
                    bindings.extend(loaded);
                }
                Err(e) => {
                    warn!("Error loading reaction roles for guild {}: {}", guild, e);
                }
            }
        }

        info!(
            "📂 Loaded {} reaction role bindings from {} guilds",
            bindings.len(),
            guilds
        );
        Ok(bindings)
    }

    async fn get(&self, key: &BindingKey) -> Result<Option<ReactionRoleBinding>, StoreError> {
        let _guard = self.lock.lock().await;

        let bindings = self.read_guild(key.guild_id).await?;
        Ok(bindings.into_iter().find(|binding| binding.key() == *key))
    }

    async fn upsert(&self, binding: &ReactionRoleBinding) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        let key = binding.key();
        let mut bindings = self.read_guild(key.guild_id).await?;
        match bindings.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => *existing = binding.clone(),
            None => bindings.push(binding.clone()),
        }

        self.write_guild(key.guild_id, &bindings).await
    }

    async fn delete(&self, key: &BindingKey) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;

        let mut bindings = self.read_guild(key.guild_id).await?;
        let before = bindings.len();
        bindings.retain(|binding| binding.key() != *key);

        if bindings.len() == before {
            return Ok(false);
        }

        self.write_guild(key.guild_id, &bindings).await?;
        Ok(true)
    }

    async fn delete_guild(&self, guild: GuildId) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;

        let removed = self.read_guild(guild).await?.len();
        self.write_guild(guild, &[]).await?;
        Ok(removed)
    }
}
