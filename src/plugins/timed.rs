use chrono::{DateTime, Utc};
use cron::Schedule;
use serenity::model::id::ChannelId;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{audio::transport::MessageSink, plugins::TimedMessage};

/// Time until the schedule next fires after `now`.
pub(crate) fn next_delay(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    (next - now).to_std().ok()
}

/// Spawns one task per timed message; invalid cron expressions are logged
/// and skipped.
pub fn start(
    messages: &[TimedMessage],
    channel_id: ChannelId,
    sink: Arc<dyn MessageSink>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    messages
        .iter()
        .filter_map(|message| match Schedule::from_str(&message.cron) {
            Ok(schedule) => {
                info!(name = %message.name, cron = %message.cron, "⏰ Mensaje programado registrado");
                Some(tokio::spawn(run(
                    message.clone(),
                    schedule,
                    channel_id,
                    sink.clone(),
                    cancel.clone(),
                )))
            }
            Err(e) => {
                error!(name = %message.name, "Error starting timed message: {}", e);
                None
            }
        })
        .collect()
}

async fn run(
    message: TimedMessage,
    schedule: Schedule,
    channel_id: ChannelId,
    sink: Arc<dyn MessageSink>,
    cancel: CancellationToken,
) {
    loop {
        let Some(delay) = next_delay(&schedule, Utc::now()) else {
            warn!(name = %message.name, "El cron no tiene más ejecuciones");
            return;
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(name = %message.name, "Mensaje programado detenido");
                return;
            }
            _ = tokio::time::sleep(delay) => {
                if let Err(e) = sink.send(channel_id, (message.exec)()).await {
                    error!(name = %message.name, "Error enviando mensaje programado: {:?}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::testing::FakeSink, ui::Reply};
    use chrono::TimeZone;

    fn tick() -> Reply {
        Reply::text("tick")
    }

    fn timed(cron: &str) -> TimedMessage {
        TimedMessage {
            name: "tick".to_string(),
            cron: cron.to_string(),
            exec: tick,
        }
    }

    #[test]
    fn next_delay_lands_on_the_next_multiple_of_five() {
        let schedule = Schedule::from_str("0/5 * * * * *").expect("valid cron");
        let now = Utc
            .with_ymd_and_hms(2024, 1, 1, 12, 0, 2)
            .single()
            .expect("valid date");

        assert_eq!(next_delay(&schedule, now), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn invalid_expressions_are_skipped() {
        let sink = Arc::new(FakeSink::default());
        let cancel = CancellationToken::new();

        let handles = start(
            &[timed("not a cron"), timed("* * * * * *")],
            ChannelId::new(1),
            sink,
            cancel.clone(),
        );

        assert_eq!(handles.len(), 1);
        cancel.cancel();
        for handle in handles {
            handle.await.expect("task exits cleanly");
        }
    }

    #[tokio::test]
    async fn every_second_schedule_posts() {
        let sink = Arc::new(FakeSink::default());
        let cancel = CancellationToken::new();

        let handles = start(
            &[timed("* * * * * *")],
            ChannelId::new(42),
            sink.clone(),
            cancel.clone(),
        );

        crate::audio::testing::eventually_within(Duration::from_secs(3), || {
            !sink.sent_to(ChannelId::new(42)).is_empty()
        })
        .await;
        cancel.cancel();
        for handle in handles {
            handle.await.expect("task exits cleanly");
        }
        assert_eq!(sink.sent_to(ChannelId::new(42))[0], Reply::text("tick"));
    }
}
