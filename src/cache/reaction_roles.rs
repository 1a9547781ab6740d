use dashmap::DashMap;
use serenity::model::id::{GuildId, MessageId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::binding::{BindingKey, EmoteKey, ReactionRoleBinding};
use crate::storage::{BindingStore, StoreError};

/// Write-through cache of reaction-role bindings.
///
/// The only way to obtain one is [`ReactionRoleCache::load`], which returns after
/// the full store scan, so nothing can query a half-populated cache. After
/// loading, a miss means the binding does not exist; the store is never asked.
pub struct ReactionRoleCache {
    store: Arc<dyn BindingStore>,
    bindings: DashMap<BindingKey, ReactionRoleBinding>,
    // Number of bindings per message, for the cheap tracked-message filter.
    messages: DashMap<(GuildId, MessageId), usize>,
    // Store and cache see concurrent writes in the same order.
    write_gate: Mutex<()>,
}

impl ReactionRoleCache {
    pub async fn load(store: Arc<dyn BindingStore>) -> Result<Self, StoreError> {
        let cache = Self {
            store,
            bindings: DashMap::new(),
            messages: DashMap::new(),
            write_gate: Mutex::new(()),
        };

        for binding in cache.store.load_all().await? {
            cache.insert_cached(binding);
        }

        info!("✅ Reaction role cache ready ({} bindings)", cache.len());
        Ok(cache)
    }

    pub fn is_tracked_message(&self, guild: GuildId, message: MessageId) -> bool {
        self.messages.contains_key(&(guild, message))
    }

    pub fn lookup(
        &self,
        guild: GuildId,
        message: MessageId,
        emote: &EmoteKey,
    ) -> Option<ReactionRoleBinding> {
        let key = BindingKey {
            guild_id: guild,
            message_id: message,
            emote: emote.clone(),
        };
        self.bindings.get(&key).map(|entry| entry.value().clone())
    }

    /// Persists the binding, then caches it. Last writer wins for the same key.
    pub async fn upsert(&self, binding: ReactionRoleBinding) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;

        self.store.upsert(&binding).await?;

        debug!(
            "Bound {} on message {} to role {} in guild {}",
            binding.emote_display, binding.message_id, binding.role_id, binding.guild_id
        );
        self.insert_cached(binding);
        Ok(())
    }

    /// Deletes the binding from the store, then from the cache.
    pub async fn remove(&self, key: &BindingKey) -> Result<Option<ReactionRoleBinding>, StoreError> {
        let _gate = self.write_gate.lock().await;

        self.store.delete(key).await?;
        Ok(self.remove_cached(key))
    }

    /// Bindings of one guild ordered by message, then emote.
    pub fn list_for_guild(&self, guild: GuildId) -> Vec<ReactionRoleBinding> {
        let mut bindings: Vec<ReactionRoleBinding> = self
            .bindings
            .iter()
            .filter(|entry| entry.key().guild_id == guild)
            .map(|entry| entry.value().clone())
            .collect();

        bindings.sort_by(|a, b| {
            a.message_id
                .cmp(&b.message_id)
                .then_with(|| a.emote.cmp(&b.emote))
        });
        bindings
    }

    pub async fn remove_all_for_guild(&self, guild: GuildId) -> Result<usize, StoreError> {
        let _gate = self.write_gate.lock().await;

        self.store.delete_guild(guild).await?;

        let before = self.bindings.len();
        self.bindings.retain(|key, _| key.guild_id != guild);
        self.messages.retain(|(message_guild, _), _| *message_guild != guild);
        let removed = before - self.bindings.len();

        info!("🗑️ Cleared {} reaction roles in guild {}", removed, guild);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    fn insert_cached(&self, binding: ReactionRoleBinding) {
        let message = (binding.guild_id, binding.message_id);
        if self.bindings.insert(binding.key(), binding).is_none() {
            *self.messages.entry(message).or_insert(0) += 1;
        }
    }

    fn remove_cached(&self, key: &BindingKey) -> Option<ReactionRoleBinding> {
        let (_, removed) = self.bindings.remove(key)?;

        let message = (key.guild_id, key.message_id);
        if let Some(mut count) = self.messages.get_mut(&message) {
            *count = count.saturating_sub(1);
        }
        self.messages.remove_if(&message, |_, count| *count == 0);

        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonBindingStore;
    use pretty_assertions::assert_eq;
    use serenity::model::id::RoleId;
    use tempfile::TempDir;

    const GUILD: GuildId = GuildId::new(1);

    fn binding(guild: GuildId, message: u64, emote: &str, role: u64) -> ReactionRoleBinding {
        ReactionRoleBinding {
            guild_id: guild,
            message_id: MessageId::new(message),
            emote: EmoteKey::parse(emote).unwrap(),
            emote_display: emote.to_string(),
            role_id: RoleId::new(role),
        }
    }

    fn key(guild: GuildId, message: u64, emote: &str) -> BindingKey {
        BindingKey {
            guild_id: guild,
            message_id: MessageId::new(message),
            emote: EmoteKey::parse(emote).unwrap(),
        }
    }

    async fn open(dir: &TempDir) -> (Arc<dyn BindingStore>, ReactionRoleCache) {
        let store: Arc<dyn BindingStore> = Arc::new(JsonBindingStore::new(dir.path()).await.unwrap());
        let cache = ReactionRoleCache::load(store.clone()).await.unwrap();
        (store, cache)
    }

    #[tokio::test]
    async fn test_load_populates_from_store() {
        let dir = TempDir::new().unwrap();
        {
            let (_, cache) = open(&dir).await;
            cache.upsert(binding(GUILD, 100, "👍", 7)).await.unwrap();
            cache.upsert(binding(GUILD, 100, "<:party:555>", 8)).await.unwrap();
        }

        let (_, cache) = open(&dir).await;

        assert_eq!(cache.len(), 2);
        assert!(cache.is_tracked_message(GUILD, MessageId::new(100)));
        let party = EmoteKey::parse("<a:party:555>").unwrap();
        assert_eq!(
            cache.lookup(GUILD, MessageId::new(100), &party).map(|b| b.role_id),
            Some(RoleId::new(8))
        );
    }

    #[tokio::test]
    async fn test_lookup_follows_store_after_every_write() {
        let dir = TempDir::new().unwrap();
        let (store, cache) = open(&dir).await;

        let thumbs = binding(GUILD, 100, "👍", 7);
        let key = thumbs.key();

        let steps: Vec<Option<ReactionRoleBinding>> = vec![
            Some(thumbs.clone()),
            Some(binding(GUILD, 100, "👍", 8)),
            None,
            None,
            Some(binding(GUILD, 100, "👍", 9)),
        ];

        for step in steps {
            match step {
                Some(b) => cache.upsert(b).await.unwrap(),
                None => {
                    cache.remove(&key).await.unwrap();
                }
            }

            let cached = cache.lookup(key.guild_id, key.message_id, &key.emote);
            let stored = store.get(&key).await.unwrap();
            assert_eq!(cached, stored);
        }
    }

    #[tokio::test]
    async fn test_tracked_message_follows_bindings() {
        let dir = TempDir::new().unwrap();
        let (_, cache) = open(&dir).await;
        let message = MessageId::new(100);

        cache.upsert(binding(GUILD, 100, "👍", 7)).await.unwrap();
        cache.upsert(binding(GUILD, 100, "👎", 8)).await.unwrap();
        assert!(cache.is_tracked_message(GUILD, message));
        assert!(!cache.is_tracked_message(GuildId::new(2), message));

        cache.remove(&key(GUILD, 100, "👍")).await.unwrap();
        assert!(cache.is_tracked_message(GUILD, message));

        let removed = cache.remove(&key(GUILD, 100, "👎")).await.unwrap();
        assert_eq!(removed.map(|b| b.role_id), Some(RoleId::new(8)));
        assert!(!cache.is_tracked_message(GUILD, message));

        assert!(cache.remove(&key(GUILD, 100, "👎")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_clear_are_guild_scoped() {
        let dir = TempDir::new().unwrap();
        let (store, cache) = open(&dir).await;
        let other = GuildId::new(2);

        cache.upsert(binding(GUILD, 300, "👍", 7)).await.unwrap();
        cache.upsert(binding(GUILD, 100, "👎", 7)).await.unwrap();
        cache.upsert(binding(other, 100, "👍", 9)).await.unwrap();

        let listed: Vec<u64> = cache
            .list_for_guild(GUILD)
            .iter()
            .map(|b| b.message_id.get())
            .collect();
        assert_eq!(listed, vec![100, 300]);

        assert_eq!(cache.remove_all_for_guild(GUILD).await.unwrap(), 2);
        assert!(cache.list_for_guild(GUILD).is_empty());
        assert!(!cache.is_tracked_message(GUILD, MessageId::new(100)));
        assert!(cache.is_tracked_message(other, MessageId::new(100)));
        assert_eq!(store.load_all().await.unwrap(), vec![binding(other, 100, "👍", 9)]);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_converge() {
        let dir = TempDir::new().unwrap();
        let (store, cache) = open(&dir).await;
        let cache = Arc::new(cache);

        let mut tasks = Vec::new();
        for role in 1..=8u64 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache.upsert(binding(GUILD, 100, "👍", role)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let thumbs = key(GUILD, 100, "👍");
        let cached = cache.lookup(GUILD, MessageId::new(100), &thumbs.emote);
        assert!(cached.as_ref().is_some_and(|b| (1..=8).contains(&b.role_id.get())));
        assert_eq!(cached, store.get(&thumbs).await.unwrap());
        assert_eq!(cache.len(), 1);
    }
}
