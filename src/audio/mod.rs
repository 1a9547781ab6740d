//! # Audio Module
//!
//! Guild-scoped playback over a remote audio node.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Orchestrator
//! - Owns every guild's queue, loop mode and current track
//! - Decides what plays next when the node reports a track end
//!
//! ### [`registry`] - Guild Registry
//! - Guild → exclusively owned state record, one async lock per guild
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue with shuffle and duplicate removal, plus [`queue::LoopMode`]
//!
//! ### [`node`] / [`lavalink`] - Audio Node
//! - [`node::AudioNode`] is everything the orchestrator may ask of the node
//! - [`lavalink::LavalinkNode`] implements it over Lavalink v4
//!
//! ### [`events`] - Node Events
//! - Routes [`node::NodeEvent`]s to one worker per guild, in arrival order
//!
//! ## Wiring
//!
//! `main` builds a [`lavalink::LavalinkNode`], hands its event channel to
//! [`events::run_node_events`] and shares one [`player::PlaybackOrchestrator`]
//! between the event loop and the command handlers.

pub mod events;
pub mod lavalink;
pub mod node;
pub mod player;
pub mod queue;
pub mod registry;
pub mod track;
