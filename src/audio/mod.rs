//! # Audio Module
//!
//! Per-guild voice playback for the bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Playback Queue
//! - FIFO of resolved tracks, one per session, behind its own lock
//! - Reports 1-based positions for "queued in position N" feedback
//!
//! ### [`session`] - Audio Session
//! - Owns one voice transport, one queue and one control channel
//! - Runs at most one playback loop, which races user control signals
//!   (pause/resume/skip/stop) against the stream's completion signal
//!
//! ### [`registry`] - Session Registry
//! - Guild → session map, the single authority for create/lookup/destroy
//!
//! ### [`watchdog`] - Disconnect Watchdog
//! - Background task that tears down sessions left alone in a channel
//!
//! ### [`transport`] / [`songbird_transport`]
//! - Traits the core depends on, and their songbird implementation
//!
//! Sessions for different guilds share nothing but the registry map, so a
//! stop in one guild never touches another.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = Arc::new(SessionRegistry::new());
//! let (session, _) = registry
//!     .get_or_create(guild_id, || async {
//!         let transport = connector.join(guild_id, channel_id).await?;
//!         Ok::<_, VoiceError>(AudioSession::new(transport, sink.clone()))
//!     })
//!     .await?;
//!
//! session.enqueue(track)?;
//! session.pause();
//! session.skip();
//! ```

pub mod queue;
pub mod registry;
pub mod session;
pub mod songbird_transport;
pub mod transport;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;
