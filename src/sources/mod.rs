pub mod ytdlp;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ResolveError;

pub use ytdlp::YtDlpResolver;

/// Playable reference produced by a [`MediaResolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    /// Direct URL of the audio stream handed to the voice transport.
    pub stream_url: String,
    pub title: String,
    /// `None` for live streams.
    pub duration: Option<Duration>,
}

/// Trait común para resolver enlaces de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolves a user supplied link into a stream URL plus metadata.
    async fn resolve(&self, link: &str) -> Result<ResolvedMedia, ResolveError>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}
