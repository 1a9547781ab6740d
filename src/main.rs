use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod storage;
mod ui;

use crate::audio::{events::run_node_events, lavalink::LavalinkNode, player::PlaybackOrchestrator};
use crate::bot::{gateway::DiscordGateway, reactions::ReactionRoleService, GuildTuneBot};
use crate::cache::ReactionRoleCache;
use crate::config::Config;
use crate::storage::{BindingStore, JsonBindingStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guildtune=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting guildtune v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    // The cache is only handed out once the full store scan has finished.
    let store: Arc<dyn BindingStore> = Arc::new(JsonBindingStore::new(&config.data_dir).await?);
    let reaction_cache = Arc::new(ReactionRoleCache::load(store).await?);

    let http = Arc::new(Http::new(&config.discord_token));
    let user_id = http.get_current_user().await?.id;
    let gateway = Arc::new(DiscordGateway::new(http));

    let songbird = Songbird::serenity();
    let node = Arc::new(LavalinkNode::new(&config, user_id, songbird.clone())?);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    node.clone().spawn_event_stream(events_tx);

    let player = Arc::new(PlaybackOrchestrator::new(
        node,
        gateway.clone(),
        config.default_volume,
    ));
    tokio::spawn(run_node_events(player.clone(), events_rx));

    let reactions = Arc::new(ReactionRoleService::new(reaction_cache, gateway));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let handler = GuildTuneBot::new(config.clone(), player, reactions);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error listening for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
