//! In-memory doubles for the voice seams, shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{oneshot, Notify};

use crate::{
    audio::{
        queue::QueuedTrack,
        transport::{
            ActiveStream, MessageSink, StreamControl, StreamEnd, VoiceConnector, VoiceRoster,
            VoiceTransport,
        },
    },
    error::{TransportError, VoiceError},
    ui::Reply,
};

/// Polls `condition` until it holds, failing the test after one second.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    eventually_within(Duration::from_secs(1), condition).await
}

pub(crate) async fn eventually_within(timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            timeout
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Paused(String),
    Resumed(String),
    Aborted(String),
}

struct FakeStream {
    title: String,
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl StreamControl for FakeStream {
    fn set_paused(&self, paused: bool) -> Result<(), TransportError> {
        let event = if paused {
            StreamEvent::Paused(self.title.clone())
        } else {
            StreamEvent::Resumed(self.title.clone())
        };
        self.events.lock().push(event);
        Ok(())
    }

    fn abort(&self) {
        self.events
            .lock()
            .push(StreamEvent::Aborted(self.title.clone()));
    }
}

pub(crate) struct FakeTransport {
    guild_id: GuildId,
    channel_id: ChannelId,
    speaking: AtomicBool,
    streamed: Mutex<Vec<String>>,
    events: Arc<Mutex<Vec<StreamEvent>>>,
    finisher: Mutex<Option<oneshot::Sender<StreamEnd>>>,
    failing_titles: Mutex<HashSet<String>>,
    disconnects: AtomicUsize,
    disconnect_fails: AtomicBool,
    speaking_off_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeTransport {
    pub(crate) fn new(guild_id: GuildId, channel_id: ChannelId) -> Self {
        Self {
            guild_id,
            channel_id,
            speaking: AtomicBool::new(false),
            streamed: Mutex::new(Vec::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            finisher: Mutex::new(None),
            failing_titles: Mutex::new(HashSet::new()),
            disconnects: AtomicUsize::new(0),
            disconnect_fails: AtomicBool::new(false),
            speaking_off_gate: Mutex::new(None),
        }
    }

    /// Titles of streams that were opened successfully, in order.
    pub(crate) fn streamed(&self) -> Vec<String> {
        self.streamed.lock().clone()
    }

    pub(crate) fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Fires the completion signal of the most recent stream.
    pub(crate) fn finish_current(&self, end: StreamEnd) {
        if let Some(tx) = self.finisher.lock().take() {
            let _ = tx.send(end);
        }
    }

    pub(crate) fn fail_stream_for(&self, title: &str) {
        self.failing_titles.lock().insert(title.to_string());
    }

    /// Makes the next `set_speaking(false)` wait until the returned gate
    /// is notified.
    pub(crate) fn hold_speaking_off(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.speaking_off_gate.lock() = Some(gate.clone());
        gate
    }

    pub(crate) fn fail_disconnect(&self) {
        self.disconnect_fails.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        let gate = if speaking {
            None
        } else {
            self.speaking_off_gate.lock().take()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.speaking.store(speaking, Ordering::SeqCst);
        Ok(())
    }

    async fn stream(&self, track: &QueuedTrack) -> Result<ActiveStream, TransportError> {
        if self.failing_titles.lock().contains(&track.title) {
            return Err(TransportError::Stream(format!("cannot open {}", track.title)));
        }

        let (tx, rx) = oneshot::channel();
        *self.finisher.lock() = Some(tx);
        self.streamed.lock().push(track.title.clone());

        Ok(ActiveStream::new(
            Box::new(FakeStream {
                title: track.title.clone(),
                events: self.events.clone(),
            }),
            rx,
        ))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.disconnect_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnect("gateway gone".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeSink {
    sent: Mutex<Vec<(ChannelId, Reply)>>,
    direct: Mutex<Vec<(UserId, Reply)>>,
    reactions: Mutex<Vec<(MessageId, String)>>,
}

impl FakeSink {
    pub(crate) fn direct(&self) -> Vec<(UserId, Reply)> {
        self.direct.lock().clone()
    }

    pub(crate) fn reactions(&self) -> Vec<(MessageId, String)> {
        self.reactions.lock().clone()
    }

    pub(crate) fn replies(&self) -> Vec<Reply> {
        self.sent.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub(crate) fn sent_to(&self, channel_id: ChannelId) -> Vec<Reply> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Track titles of every "now playing" embed, in send order.
    pub(crate) fn now_playing(&self) -> Vec<String> {
        self.replies()
            .into_iter()
            .filter_map(|reply| match reply {
                Reply::Embed(embed) if embed.title.as_deref() == Some("🎵 Now Playing") => embed
                    .description
                    .map(|d| d.trim_matches('*').to_string()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessageSink for FakeSink {
    async fn send(&self, channel_id: ChannelId, reply: Reply) -> anyhow::Result<()> {
        self.sent.lock().push((channel_id, reply));
        Ok(())
    }

    async fn send_direct(&self, user_id: UserId, reply: Reply) -> anyhow::Result<()> {
        self.direct.lock().push((user_id, reply));
        Ok(())
    }

    async fn react(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> anyhow::Result<()> {
        self.reactions.lock().push((message_id, emoji.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeRoster {
    members: Mutex<HashMap<UserId, ChannelId>>,
    listeners: Mutex<HashMap<ChannelId, usize>>,
    counts_fail: AtomicBool,
}

impl FakeRoster {
    pub(crate) fn put_user(&self, user_id: UserId, channel_id: ChannelId) {
        self.members.lock().insert(user_id, channel_id);
    }

    pub(crate) fn set_listeners(&self, channel_id: ChannelId, count: usize) {
        self.listeners.lock().insert(channel_id, count);
    }

    pub(crate) fn fail_counts(&self) {
        self.counts_fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceRoster for FakeRoster {
    fn voice_channel_of(&self, _guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.members.lock().get(&user_id).copied()
    }

    async fn listener_count(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<usize, TransportError> {
        if self.counts_fail.load(Ordering::SeqCst) {
            return Err(TransportError::GuildUnavailable(guild_id));
        }
        Ok(self.listeners.lock().get(&channel_id).copied().unwrap_or(0))
    }
}

/// Hands out a fresh [`FakeTransport`] per join and keeps them for inspection.
#[derive(Default)]
pub(crate) struct FakeConnector {
    joined: Mutex<HashMap<GuildId, Arc<FakeTransport>>>,
    joins: AtomicUsize,
    join_fails: AtomicBool,
    join_hangs: AtomicBool,
}

impl FakeConnector {
    pub(crate) fn transport(&self, guild_id: GuildId) -> Option<Arc<FakeTransport>> {
        self.joined.lock().get(&guild_id).cloned()
    }

    pub(crate) fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_joins(&self) {
        self.join_fails.store(true, Ordering::SeqCst);
    }

    /// Every later join waits forever, like a voice server that never answers.
    pub(crate) fn hang_joins(&self) {
        self.join_hangs.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceTransport>, VoiceError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if self.join_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.join_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Join("missing permissions".to_string()).into());
        }
        let transport = Arc::new(FakeTransport::new(guild_id, channel_id));
        self.joined.lock().insert(guild_id, transport.clone());
        Ok(transport)
    }
}
