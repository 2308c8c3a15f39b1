use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, UserId};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::sources::ResolvedMedia;

/// A resolved track waiting in (or taken from) a guild's queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTrack {
    pub source_link: String,
    pub stream_url: String,
    pub title: String,
    pub duration: Option<Duration>,
    /// Channel that receives the "now playing" notice for this track.
    pub response_channel: ChannelId,
    pub requested_by: UserId,
    pub queued_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(
        source_link: impl Into<String>,
        media: ResolvedMedia,
        response_channel: ChannelId,
        requested_by: UserId,
    ) -> Self {
        Self {
            source_link: source_link.into(),
            stream_url: media.stream_url,
            title: media.title,
            duration: media.duration,
            response_channel,
            requested_by,
            queued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<QueuedTrack>,
    current: Option<QueuedTrack>,
}

/// FIFO of pending tracks for one session.
///
/// The track last handed out by [`PlaybackQueue::take_next`] is kept as the
/// "current" slot so user-facing positions count the track that is playing.
/// Every operation takes the internal lock for its whole duration and never
/// waits on anything else.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    inner: Mutex<QueueInner>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track and returns its 1-based position, counting the
    /// current track as position 1.
    pub fn add(&self, track: QueuedTrack) -> usize {
        let mut inner = self.inner.lock();
        info!("➕ Agregado a la cola: {}", track.title);
        inner.pending.push_back(track);
        inner.pending.len() + usize::from(inner.current.is_some())
    }

    /// Removes the head of the queue and makes it current.
    ///
    /// Returns `None` when nothing is pending; the current slot is cleared in
    /// that case.
    pub fn take_next(&self) -> Option<QueuedTrack> {
        let mut inner = self.inner.lock();
        inner.current = inner.pending.pop_front();
        match &inner.current {
            Some(track) => debug!("➡️ Siguiente en cola (FIFO): {}", track.title),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        inner.current.clone()
    }

    pub fn current(&self) -> Option<QueuedTrack> {
        self.inner.lock().current.clone()
    }

    /// Snapshot of the tracks waiting behind the current one.
    pub fn pending(&self) -> Vec<QueuedTrack> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.current = None;
        info!("🗑️ Cola limpiada");
    }
}
