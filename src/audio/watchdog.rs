use std::{sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audio::{registry::SessionRegistry, transport::VoiceRoster};

/// Periodically tears down sessions whose voice channel only holds the bot.
///
/// This is the only place a session is destroyed without a user command.
pub struct DisconnectWatchdog {
    registry: Arc<SessionRegistry>,
    roster: Arc<dyn VoiceRoster>,
    interval: Duration,
}

impl DisconnectWatchdog {
    pub fn new(
        registry: Arc<SessionRegistry>,
        roster: Arc<dyn VoiceRoster>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            roster,
            interval,
        }
    }

    /// Runs until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("👀 Watchdog de desconexión iniciado ({:?})", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Watchdog de desconexión detenido");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = self.sweep().await;
                    if removed > 0 {
                        let remaining = self.registry.len().await;
                        debug!(removed, remaining, "Sesiones inactivas eliminadas");
                    }
                }
            }
        }
    }

    /// One pass over every registered session; returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut removed = 0;

        for session in self.registry.snapshot().await {
            let guild_id = session.guild_id();
            let count = match self
                .roster
                .listener_count(guild_id, session.channel_id())
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    error!(guild_id = %guild_id, "Error obteniendo oyentes: {}", e);
                    continue;
                }
            };

            if count > 1 {
                continue;
            }

            info!("🚪 Bot solo en el canal, desconectando en guild {}", guild_id);
            // shutdown logs a failed disconnect; removal happens regardless
            session.shutdown().await;
            if self.registry.remove_if_same(guild_id, &session).await {
                removed += 1;
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            queue::tests::track,
            session::{AudioSession, PlaybackStatus},
            testing::{eventually, FakeRoster, FakeSink, FakeTransport},
        },
        error::VoiceError,
    };
    use serenity::model::id::{ChannelId, GuildId};

    async fn register(
        registry: &SessionRegistry,
        guild: u64,
        channel: u64,
    ) -> (Arc<AudioSession>, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new(
            GuildId::new(guild),
            ChannelId::new(channel),
        ));
        let (session, _) = registry
            .get_or_create(GuildId::new(guild), || async {
                Ok::<_, VoiceError>(AudioSession::new(
                    transport.clone(),
                    Arc::new(FakeSink::default()),
                ))
            })
            .await
            .expect("join succeeds");
        (session, transport)
    }

    #[tokio::test]
    async fn lonely_session_is_stopped_and_removed() {
        let registry = Arc::new(SessionRegistry::new());
        let roster = Arc::new(FakeRoster::default());
        let (session, transport) = register(&registry, 1, 100).await;
        session.enqueue(track("a")).expect("open session");
        eventually(|| transport.streamed().len() == 1).await;
        roster.set_listeners(ChannelId::new(100), 1);

        let watchdog = DisconnectWatchdog::new(registry.clone(), roster, Duration::from_secs(1));
        assert_eq!(watchdog.sweep().await, 1);

        assert!(registry.get(GuildId::new(1)).await.is_none());
        assert_eq!(session.status(), PlaybackStatus::Stopped);
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn occupied_sessions_are_left_alone() {
        let registry = Arc::new(SessionRegistry::new());
        let roster = Arc::new(FakeRoster::default());
        let (_, transport) = register(&registry, 1, 100).await;
        roster.set_listeners(ChannelId::new(100), 3);

        let watchdog = DisconnectWatchdog::new(registry.clone(), roster, Duration::from_secs(1));

        assert_eq!(watchdog.sweep().await, 0);
        assert!(registry.get(GuildId::new(1)).await.is_some());
        assert_eq!(transport.disconnects(), 0);
    }

    #[tokio::test]
    async fn roster_errors_skip_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let roster = Arc::new(FakeRoster::default());
        register(&registry, 1, 100).await;
        roster.fail_counts();

        let watchdog = DisconnectWatchdog::new(registry.clone(), roster, Duration::from_secs(1));

        assert_eq!(watchdog.sweep().await, 0);
        assert!(registry.get(GuildId::new(1)).await.is_some());
    }

    #[tokio::test]
    async fn failed_disconnect_still_removes_session() {
        let registry = Arc::new(SessionRegistry::new());
        let roster = Arc::new(FakeRoster::default());
        let (_, transport) = register(&registry, 1, 100).await;
        transport.fail_disconnect();
        roster.set_listeners(ChannelId::new(100), 0);

        let watchdog = DisconnectWatchdog::new(registry.clone(), roster, Duration::from_secs(1));

        assert_eq!(watchdog.sweep().await, 1);
        assert!(registry.get(GuildId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn only_the_abandoned_guild_is_torn_down() {
        let registry = Arc::new(SessionRegistry::new());
        let roster = Arc::new(FakeRoster::default());
        let (_, lonely) = register(&registry, 1, 100).await;
        let (busy_session, busy) = register(&registry, 2, 200).await;
        busy_session.enqueue(track("b")).expect("open session");
        eventually(|| busy.streamed().len() == 1).await;
        roster.set_listeners(ChannelId::new(100), 1);
        roster.set_listeners(ChannelId::new(200), 4);

        let watchdog = DisconnectWatchdog::new(registry.clone(), roster, Duration::from_secs(1));
        watchdog.sweep().await;

        assert_eq!(lonely.disconnects(), 1);
        assert_eq!(busy.disconnects(), 0);
        assert_eq!(busy_session.status(), PlaybackStatus::Playing);
        assert!(busy.events().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let registry = Arc::new(SessionRegistry::new());
        let roster = Arc::new(FakeRoster::default());
        let watchdog = DisconnectWatchdog::new(registry, roster, Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(watchdog.run(cancel.clone()));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watchdog exits")
            .expect("watchdog did not panic");
    }
}
