use chrono::Utc;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{PlaybackQueue, QueuedTrack},
        transport::{ActiveStream, MessageSink, VoiceTransport},
    },
    error::VoiceError,
    ui::{embeds, Reply},
};

/// Signals buffered between a handler and the playback loop. Handlers use
/// `try_send`, so a full buffer drops the signal instead of blocking.
const CONTROL_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Pause,
    Resume,
    Skip,
    Stop,
}

/// Result of adding a track to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub position: usize,
    /// `true` when this call started the playback loop.
    pub started: bool,
}

#[derive(Debug)]
struct SessionState {
    status: PlaybackStatus,
    /// Present exactly while a playback loop is running.
    control: Option<mpsc::Sender<ControlSignal>>,
    closed: bool,
}

enum Next {
    Track(QueuedTrack),
    Empty,
    Closed,
}

enum StreamOutcome {
    /// The stream finished on its own.
    Ended,
    Skipped,
    Stop,
}

/// Live playback context for one guild.
///
/// Owns the voice transport, the queue and the control channel of its
/// playback loop. At most one loop runs per session; it is spawned by
/// [`AudioSession::enqueue`] when the session is idle and exits once the
/// queue drains or the session is torn down.
pub struct AudioSession {
    guild_id: GuildId,
    /// Follows the bot when it is moved to another channel.
    channel_id: Mutex<ChannelId>,
    transport: Arc<dyn VoiceTransport>,
    queue: PlaybackQueue,
    state: Mutex<SessionState>,
    sink: Arc<dyn MessageSink>,
}

impl AudioSession {
    pub fn new(transport: Arc<dyn VoiceTransport>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            guild_id: transport.guild_id(),
            channel_id: Mutex::new(transport.channel_id()),
            transport,
            queue: PlaybackQueue::new(),
            state: Mutex::new(SessionState {
                status: PlaybackStatus::Stopped,
                control: None,
                closed: false,
            }),
            sink,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        *self.channel_id.lock()
    }

    /// Records that the bot now sits in `channel_id`.
    pub fn move_to(&self, channel_id: ChannelId) {
        *self.channel_id.lock() = channel_id;
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.lock().status
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Queues a track, starting playback if the session is idle.
    ///
    /// A loop that ran out of tracks but has not exited yet picks the track
    /// up itself; otherwise a new loop is spawned.
    pub fn enqueue(self: &Arc<Self>, track: QueuedTrack) -> Result<Enqueued, VoiceError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(VoiceError::SessionClosed(self.guild_id));
        }

        let position = self.queue.add(track);
        if state.status != PlaybackStatus::Stopped {
            return Ok(Enqueued {
                position,
                started: false,
            });
        }

        if state.control.is_some() {
            // Status stays Stopped until the loop takes the track, so no
            // signal can be aimed at it before it plays.
            return Ok(Enqueued {
                position,
                started: position == 1,
            });
        }

        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        state.status = PlaybackStatus::Playing;
        state.control = Some(tx);
        drop(state);

        tokio::spawn(self.clone().run(rx));
        Ok(Enqueued {
            position,
            started: true,
        })
    }

    /// Sends `Pause` if currently playing.
    pub fn pause(&self) -> bool {
        self.send_guarded(
            ControlSignal::Pause,
            &[PlaybackStatus::Playing],
            Some(PlaybackStatus::Paused),
        )
    }

    /// Sends `Resume` if currently paused.
    pub fn resume(&self) -> bool {
        self.send_guarded(
            ControlSignal::Resume,
            &[PlaybackStatus::Paused],
            Some(PlaybackStatus::Playing),
        )
    }

    /// Sends `Skip` if a track is playing or paused.
    pub fn skip(&self) -> bool {
        self.send_guarded(
            ControlSignal::Skip,
            &[PlaybackStatus::Playing, PlaybackStatus::Paused],
            None,
        )
    }

    /// Checks the status and sends under the same lock. Never blocks.
    fn send_guarded(
        &self,
        signal: ControlSignal,
        allowed: &[PlaybackStatus],
        next: Option<PlaybackStatus>,
    ) -> bool {
        let mut state = self.state.lock();
        if !allowed.contains(&state.status) {
            debug!(guild_id = %self.guild_id, ?signal, status = ?state.status, "Señal ignorada");
            return false;
        }

        let result = match &state.control {
            Some(control) => control.try_send(signal),
            None => return false,
        };

        match result {
            Ok(()) => {
                if let Some(next) = next {
                    state.status = next;
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(guild_id = %self.guild_id, ?signal, "Canal de control lleno, señal descartada");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Marks the session closed and tells the loop to stop. Non-blocking.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.status = PlaybackStatus::Stopped;
        if let Some(control) = state.control.take() {
            // Dropping the sender closes the channel, so a full buffer still
            // ends the loop once it drains.
            if control.try_send(ControlSignal::Stop).is_err() {
                debug!(guild_id = %self.guild_id, "Stop no encolado, cerrando canal");
            }
        }
    }

    /// Stops playback, drops the queue and disconnects from voice.
    ///
    /// Disconnect failures are logged only; the caller still removes the
    /// session from the registry.
    pub async fn shutdown(&self) {
        self.stop();
        self.queue.clear();

        match self.transport.disconnect().await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => error!(guild_id = %self.guild_id, "Error al desconectar: {}", e),
        }
    }

    async fn run(self: Arc<Self>, mut control: mpsc::Receiver<ControlSignal>) {
        info!(guild_id = %self.guild_id, "▶️ Iniciando loop de reproducción");

        if let Err(e) = self.transport.set_speaking(true).await {
            error!(guild_id = %self.guild_id, "No se pudo activar speaking: {}", e);
            self.abandon();
            return;
        }

        let mut discard_pending = false;
        loop {
            let next = self.advance(&mut control, discard_pending);
            discard_pending = false;
            let track = match next {
                Next::Track(track) => track,
                Next::Closed => break,
                Next::Empty => {
                    // Clear speaking before going idle so a loop started by a
                    // later play never has its indicator reset by this one.
                    self.set_speaking(false).await;
                    if self.retire_if_idle() {
                        info!(guild_id = %self.guild_id, "⏹️ Cola terminada, sesión inactiva");
                        return;
                    }
                    self.set_speaking(true).await;
                    continue;
                }
            };

            let stream = match self.transport.stream(&track).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(guild_id = %self.guild_id, "Error al reproducir {}: {}", track.title, e);
                    self.notify(
                        track.response_channel,
                        Reply::voice(format!("failed to play `{}`", track.title)),
                    )
                    .await;
                    continue;
                }
            };

            let waited = Utc::now() - track.queued_at;
            info!(
                guild_id = %self.guild_id,
                waited_ms = waited.num_milliseconds(),
                "🎵 Reproduciendo: {}",
                track.title
            );
            self.notify(
                track.response_channel,
                Reply::Embed(embeds::now_playing(&track)),
            )
            .await;

            match self.drive(stream, &mut control).await {
                StreamOutcome::Ended => discard_pending = true,
                StreamOutcome::Skipped => {}
                StreamOutcome::Stop => break,
            }
        }

        self.retire();
        self.set_speaking(false).await;
        info!(guild_id = %self.guild_id, "⏹️ Loop de reproducción detenido");
    }

    /// Waits on user signals and the stream's own completion, whichever
    /// comes first.
    async fn drive(
        &self,
        mut stream: ActiveStream,
        control: &mut mpsc::Receiver<ControlSignal>,
    ) -> StreamOutcome {
        loop {
            tokio::select! {
                signal = control.recv() => match signal {
                    Some(ControlSignal::Pause) => {
                        if let Err(e) = stream.control.set_paused(true) {
                            warn!(guild_id = %self.guild_id, "No se pudo pausar: {}", e);
                        }
                        self.mark(PlaybackStatus::Paused);
                        info!("⏸️ Reproducción pausada");
                    }
                    Some(ControlSignal::Resume) => {
                        if let Err(e) = stream.control.set_paused(false) {
                            warn!(guild_id = %self.guild_id, "No se pudo reanudar: {}", e);
                        }
                        self.mark(PlaybackStatus::Playing);
                        info!("▶️ Reproducción reanudada");
                    }
                    Some(ControlSignal::Skip) => {
                        stream.control.abort();
                        info!(guild_id = %self.guild_id, "⏭️ Track saltado");
                        return StreamOutcome::Skipped;
                    }
                    Some(ControlSignal::Stop) | None => {
                        stream.control.abort();
                        return StreamOutcome::Stop;
                    }
                },
                end = &mut stream.finished => {
                    match end {
                        Ok(Ok(())) => debug!(guild_id = %self.guild_id, "Track terminado"),
                        Ok(Err(e)) => warn!(guild_id = %self.guild_id, "Stream terminó con error: {}", e),
                        Err(_) => debug!(guild_id = %self.guild_id, "Señal de fin descartada por el transporte"),
                    }
                    return StreamOutcome::Ended;
                }
            }
        }
    }

    /// Takes the next track. With `discard_pending`, signals still queued
    /// for the track that just ended are dropped first; handlers send under
    /// the same lock, so nothing aimed at the next track is lost.
    fn advance(&self, control: &mut mpsc::Receiver<ControlSignal>, discard_pending: bool) -> Next {
        let mut state = self.state.lock();
        if state.closed {
            return Next::Closed;
        }
        if discard_pending {
            while let Ok(signal) = control.try_recv() {
                debug!(guild_id = %self.guild_id, ?signal, "Señal obsoleta descartada");
            }
        }
        match self.queue.take_next() {
            Some(track) => {
                state.status = PlaybackStatus::Playing;
                Next::Track(track)
            }
            None => {
                // Idle from here on, even before the loop exits
                state.status = PlaybackStatus::Stopped;
                Next::Empty
            }
        }
    }

    /// Goes idle unless a track was queued meanwhile.
    fn retire_if_idle(&self) -> bool {
        let mut state = self.state.lock();
        if !state.closed && !self.queue.is_empty() {
            return false;
        }
        state.status = PlaybackStatus::Stopped;
        state.control = None;
        true
    }

    fn retire(&self) {
        let mut state = self.state.lock();
        state.status = PlaybackStatus::Stopped;
        state.control = None;
    }

    /// The transport is unusable: drop what was queued and go idle.
    fn abandon(&self) {
        let mut state = self.state.lock();
        self.queue.clear();
        state.status = PlaybackStatus::Stopped;
        state.control = None;
    }

    fn mark(&self, status: PlaybackStatus) {
        let mut state = self.state.lock();
        if !state.closed {
            state.status = status;
        }
    }

    async fn set_speaking(&self, speaking: bool) {
        if let Err(e) = self.transport.set_speaking(speaking).await {
            warn!(guild_id = %self.guild_id, speaking, "Error al cambiar speaking: {}", e);
        }
    }

    async fn notify(&self, channel_id: ChannelId, reply: Reply) {
        if let Err(e) = self.sink.send(channel_id, reply).await {
            warn!(guild_id = %self.guild_id, "Error al enviar mensaje: {:?}", e);
        }
    }
}
