//! Elapsed-time display clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// `"{d}d HH:MM:SS"` since `last_change`. Future timestamps read as zero.
pub fn format_elapsed(last_change: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let total = (now - last_change).num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
}

/// Owned periodic ticker. Dropping the handle stops it.
#[derive(Debug)]
pub struct ClockHandle {
    task: JoinHandle<()>,
}

impl ClockHandle {
    pub fn spawn(period: Duration, ticks: mpsc::Sender<()>) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately; the transition already
            // computed the current value.
            interval.tick().await;
            loop {
                interval.tick().await;
                if ticks.send(()).await.is_err() {
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_days_and_padded_time() {
        let last = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 4, 5, 6).unwrap();
        assert_eq!(format_elapsed(last, now), "2d 04:05:06");
        assert_eq!(format_elapsed(last, last), "0d 00:00:00");
    }

    #[test]
    fn future_timestamp_clamps_to_zero() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 30).unwrap();
        assert_eq!(format_elapsed(last, now), "0d 00:00:00");
    }

    #[tokio::test]
    async fn ticks_until_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let clock = ClockHandle::spawn(Duration::from_millis(10), tx);

        let tick = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert_eq!(tick.unwrap(), Some(()));

        drop(clock);
        // The sender lives in the aborted task, so the channel drains and closes.
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
