use serenity::model::id::GuildId;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinSet,
};
use tracing::{debug, error, info};

use super::{node::NodeEvent, player::PlaybackOrchestrator};

/// Routes node events to one worker per guild until every sender is dropped.
///
/// Events of a guild are applied in arrival order; a guild waiting on a slow
/// node call never holds up the others.
pub async fn run_node_events(
    player: Arc<PlaybackOrchestrator>,
    mut events: UnboundedReceiver<NodeEvent>,
) {
    info!("🎧 Node event loop started");

    let mut workers: HashMap<GuildId, UnboundedSender<NodeEvent>> = HashMap::new();
    let mut tasks = JoinSet::new();

    while let Some(event) = events.recv().await {
        let guild = event.guild();
        debug!("Node event for guild {}: {:?}", guild, event);

        let worker = workers
            .entry(guild)
            .or_insert_with(|| spawn_guild_worker(&mut tasks, player.clone(), guild));

        if let Err(mpsc::error::SendError(event)) = worker.send(event) {
            error!("Event worker for guild {} is gone, restarting it", guild);
            let worker = spawn_guild_worker(&mut tasks, player.clone(), guild);
            let _ = worker.send(event);
            workers.insert(guild, worker);
        }
    }

    // Closing the worker channels lets each worker drain and exit.
    drop(workers);
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("Event worker failed: {:?}", e);
        }
    }

    info!("🎧 Node event loop stopped");
}

fn spawn_guild_worker(
    tasks: &mut JoinSet<()>,
    player: Arc<PlaybackOrchestrator>,
    guild: GuildId,
) -> UnboundedSender<NodeEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<NodeEvent>();
    tasks.spawn(async move {
        debug!("Event worker started for guild {}", guild);
        while let Some(event) = rx.recv().await {
            player.handle_event(event).await;
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            node::{AudioNode, LoadResult, LoadStatus, SearchType, TrackEndReason},
            queue::LoopMode,
            track::{test_track, Track},
        },
        bot::gateway::Notifier,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serenity::model::id::ChannelId;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records started tracks; starting `held` waits until `release` fires.
    #[derive(Default)]
    struct CountingNode {
        started: Mutex<Vec<(GuildId, String)>>,
        held: Option<String>,
        release: Notify,
    }

    impl CountingNode {
        fn started_in(&self, guild: GuildId) -> Vec<String> {
            self.started
                .lock()
                .iter()
                .filter(|(g, _)| *g == guild)
                .map(|(_, id)| id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AudioNode for CountingNode {
        async fn join(&self, _: GuildId, _: ChannelId) -> Result<()> {
            Ok(())
        }
        async fn leave(&self, _: GuildId) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _: SearchType, query: &str) -> Result<LoadResult> {
            Ok(LoadResult {
                status: LoadStatus::Success,
                tracks: vec![test_track(query, 60)],
                playlist_name: None,
            })
        }
        async fn play(&self, guild: GuildId, track: &Track) -> Result<()> {
            if self.held.as_deref() == Some(track.identifier.as_str()) {
                self.release.notified().await;
            }
            self.started.lock().push((guild, track.identifier.clone()));
            Ok(())
        }
        async fn stop(&self, _: GuildId) -> Result<()> {
            Ok(())
        }
        async fn set_paused(&self, _: GuildId, _: bool) -> Result<()> {
            Ok(())
        }
        async fn set_volume(&self, _: GuildId, _: u16) -> Result<()> {
            Ok(())
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn send_message(&self, _: ChannelId, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn orchestrator(node: Arc<CountingNode>) -> Arc<PlaybackOrchestrator> {
        Arc::new(PlaybackOrchestrator::new(node, Arc::new(SilentNotifier), 30))
    }

    async fn queue_up(player: &PlaybackOrchestrator, guild: GuildId, ids: &[&str]) {
        let text = ChannelId::new(2);
        player.join(guild, ChannelId::new(3), text).await.unwrap();
        for id in ids {
            player.play(guild, text, id).await.unwrap();
        }
    }

    fn finished(guild: GuildId, id: &str) -> NodeEvent {
        NodeEvent::TrackEnd {
            guild,
            track: test_track(id, 60),
            reason: TrackEndReason::Finished,
        }
    }

    #[tokio::test]
    async fn test_events_are_applied_in_order() {
        let node = Arc::new(CountingNode::default());
        let player = orchestrator(node.clone());
        let guild = GuildId::new(1);
        queue_up(&player, guild, &["a", "b", "c"]).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_node_events(player.clone(), rx));

        tx.send(finished(guild, "a")).unwrap();
        tx.send(finished(guild, "b")).unwrap();
        tx.send(NodeEvent::SocketClosed {
            guild,
            code: 4014,
            reason: "Disconnected".to_string(),
            by_remote: true,
        })
        .unwrap();
        drop(tx);

        task.await.unwrap();

        assert_eq!(node.started_in(guild), vec!["a", "b", "c"]);
        assert!(!player.has_player(guild));
        assert_eq!(player.get_loop(guild).await, LoopMode::Off);
    }

    #[tokio::test]
    async fn test_slow_guild_does_not_hold_up_others() {
        let node = Arc::new(CountingNode {
            held: Some("a2".to_string()),
            ..Default::default()
        });
        let player = orchestrator(node.clone());
        let (slow, fast) = (GuildId::new(1), GuildId::new(2));
        queue_up(&player, slow, &["a1", "a2"]).await;
        queue_up(&player, fast, &["b1", "b2"]).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_node_events(player.clone(), rx));

        tx.send(finished(slow, "a1")).unwrap();
        tx.send(finished(fast, "b1")).unwrap();

        let advanced = tokio::time::timeout(Duration::from_secs(5), async {
            while node.started_in(fast) != vec!["b1", "b2"] {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(advanced.is_ok(), "second guild waited on the first");
        assert_eq!(node.started_in(slow), vec!["a1"]);

        node.release.notify_one();
        drop(tx);
        task.await.unwrap();

        assert_eq!(node.started_in(slow), vec!["a1", "a2"]);
    }
}
