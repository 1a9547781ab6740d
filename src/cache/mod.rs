//! # Cache Module
//!
//! In-memory view of the reaction-role bindings.
//!
//! [`ReactionRoleCache`] answers "does this (guild, message, emote) grant a role"
//! without touching disk. Every mutation is written to the [`BindingStore`]
//! first and mirrored into memory only after the store accepted it.
//!
//! ## Startup
//!
//! [`ReactionRoleCache::load`] scans the whole store before returning, so a
//! cache value only exists once it is complete. A miss is authoritative.
//!
//! [`BindingStore`]: crate::storage::BindingStore

mod binding;
mod reaction_roles;

pub use binding::{BindingKey, EmoteKey, ReactionRoleBinding};
pub use reaction_roles::ReactionRoleCache;
