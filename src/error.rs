use serenity::model::id::GuildId;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the voice playback core.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// The session was torn down while a handler still held a reference to it.
    #[error("audio session for guild {0} is closed")]
    SessionClosed(GuildId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures talking to the voice transport (join, stream, disconnect).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to join voice channel: {0}")]
    Join(String),

    #[error("failed to disconnect from voice channel: {0}")]
    Disconnect(String),

    #[error("stream failed: {0}")]
    Stream(String),

    #[error("failed to control stream: {0}")]
    Control(String),

    #[error("guild {0} not available in cache")]
    GuildUnavailable(GuildId),
}

/// Failures turning a user supplied link into something playable.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("extractor failed: {0}")]
    Extractor(String),

    #[error("resolution timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed extractor output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
