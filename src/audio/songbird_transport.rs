use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::{
    audio::{
        queue::QueuedTrack,
        transport::{ActiveStream, StreamControl, StreamEnd, VoiceConnector, VoiceTransport},
    },
    error::{TransportError, VoiceError},
};

/// Joins voice channels through the songbird manager registered on the client.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; Discord Music Bot)")
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self { manager, http })
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceTransport>, VoiceError> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            TransportError::Join(e.to_string())
        })?;

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(Arc::new(SongbirdTransport {
            guild_id,
            channel_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
        }))
    }
}

/// One songbird `Call`, owned by a single session.
pub struct SongbirdTransport {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// The driver raises the speaking flag by itself once frames flow, so
    /// only the "off" edge needs work: silence whatever is still queued.
    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        if !speaking {
            self.call.lock().await.stop();
        }
        debug!(guild_id = %self.guild_id, speaking, "Speaking actualizado");
        Ok(())
    }

    async fn stream(&self, track: &QueuedTrack) -> Result<ActiveStream, TransportError> {
        let input: Input = HttpRequest::new(self.http.clone(), track.stream_url.clone()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        let (tx, rx) = oneshot::channel();
        let notifier = CompletionNotifier {
            guild_id: self.guild_id,
            tx: Arc::new(Mutex::new(Some(tx))),
        };

        // End and Error share one sender; whichever fires first wins.
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                let _ = handle.stop();
                return Err(TransportError::Stream(format!(
                    "Error al agregar event handler: {}",
                    e
                )));
            }
        }

        Ok(ActiveStream::new(Box::new(SongbirdStream { handle }), rx))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(TransportError::Disconnect(e.to_string())),
        }
    }
}

struct SongbirdStream {
    handle: TrackHandle,
}

impl StreamControl for SongbirdStream {
    fn set_paused(&self, paused: bool) -> Result<(), TransportError> {
        let result = if paused {
            self.handle.pause()
        } else {
            self.handle.play()
        };
        result.map_err(|e| TransportError::Control(e.to_string()))
    }

    fn abort(&self) {
        if let Err(e) = self.handle.stop() {
            debug!("Track ya detenido: {}", e);
        }
    }
}

/// Forwards the first End/Error event of a track to its session.
#[derive(Clone)]
struct CompletionNotifier {
    guild_id: GuildId,
    tx: Arc<Mutex<Option<oneshot::Sender<StreamEnd>>>>,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let failure = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        let end = match failure {
            Some(reason) => {
                error!("❌ Error en track para guild {}: {}", self.guild_id, reason);
                Err(TransportError::Stream(reason))
            }
            None => {
                debug!("🎵 Track terminó en guild {}", self.guild_id);
                Ok(())
            }
        };

        if let Some(tx) = self.tx.lock().take() {
            // The session may already have moved on (skip/stop)
            let _ = tx.send(end);
        }

        Some(Event::Cancel)
    }
}
