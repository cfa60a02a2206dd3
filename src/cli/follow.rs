use crate::core::settings::Settings;
use crate::poller::Poller;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::watch;

/// How long to wait for an in-flight refresh after stopping.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Finished,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    TogglePause,
    Reload,
}

/// Runs until `finished` turns true or the user hits Ctrl-C, then stops the
/// poller. SIGUSR1 toggles pause/resume, SIGHUP re-reads the polling intervals.
pub async fn drive(poller: &Poller, mut finished: watch::Receiver<bool>) -> Result<Exit> {
    let mut signals = ControlSignals::new()?;

    let exit = if *finished.borrow_and_update() {
        Exit::Finished
    } else {
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    break Exit::Interrupted;
                }
                changed = finished.changed() => {
                    if changed.is_err() || *finished.borrow_and_update() {
                        break Exit::Finished;
                    }
                }
                control = signals.recv() => match control {
                    Control::TogglePause => toggle_pause(poller),
                    Control::Reload => reload_intervals(poller),
                },
            }
        }
    };

    poller.stop();
    wait_idle(poller).await;
    Ok(exit)
}

fn toggle_pause(poller: &Poller) {
    let status = poller.status();
    if status.paused {
        poller.resume();
        tracing::info!("Polling resumed");
    } else if status.active {
        poller.pause();
        tracing::info!(
            running = status.running,
            "Polling paused; send SIGUSR1 again to resume"
        );
    }
}

fn reload_intervals(poller: &Poller) {
    match Settings::load() {
        Ok(settings) => apply_intervals(poller, &settings),
        Err(e) => tracing::warn!(
            error = %format!("{e:#}"),
            "Failed to reload config, keeping current intervals"
        ),
    }
}

fn apply_intervals(poller: &Poller, settings: &Settings) {
    let config = settings.polling.poller_config();
    poller.set_interval(config.interval);
    poller.set_pending_interval(config.pending_interval);
    tracing::info!(
        interval = ?config.interval,
        pending_interval = ?config.pending_interval,
        "Polling intervals reloaded"
    );
}

async fn wait_idle(poller: &Poller) {
    let mut status_rx = poller.subscribe();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, status_rx.wait_for(|s| !s.running))
        .await
        .is_ok();
    if !drained {
        tracing::debug!("Leaving in-flight refresh behind");
    }
}

#[cfg(unix)]
struct ControlSignals {
    toggle: tokio::signal::unix::Signal,
    reload: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ControlSignals {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let toggle =
            signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
        let reload = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        Ok(Self { toggle, reload })
    }

    async fn recv(&mut self) -> Control {
        tokio::select! {
            Some(()) = self.toggle.recv() => Control::TogglePause,
            Some(()) = self.reload.recv() => Control::Reload,
            else => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
struct ControlSignals;

#[cfg(not(unix))]
impl ControlSignals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Control {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting(calls: &Arc<AtomicU32>, latency: Duration) -> impl crate::poller::Refresh {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(latency).await;
                anyhow::Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_stops_when_finished() {
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::builder(counting(&calls, Duration::ZERO)).spawn();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            done_tx.send_replace(true);
        });

        let exit = drive(&poller, done_rx).await.unwrap();
        assert_eq!(exit, Exit::Finished);
        assert!(!poller.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_returns_at_once_when_already_finished() {
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::builder(counting(&calls, Duration::ZERO))
            .config(PollerConfig::default().with_auto_start(false))
            .spawn();
        poller.start();
        let (_done_tx, done_rx) = watch::channel(true);

        let exit = drive(&poller, done_rx).await.unwrap();
        assert_eq!(exit, Exit::Finished);
        assert!(!poller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_waits_for_in_flight_refresh() {
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::builder(counting(&calls, Duration::from_secs(2))).spawn();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            done_tx.send_replace(true);
        });

        drive(&poller, done_rx).await.unwrap();
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_pause() {
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::builder(counting(&calls, Duration::ZERO)).spawn();

        toggle_pause(&poller);
        assert!(poller.is_paused());
        toggle_pause(&poller);
        assert!(!poller.is_paused());

        poller.stop();
        toggle_pause(&poller);
        assert!(!poller.is_paused());
        assert!(!poller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_intervals_reschedules() {
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::builder(counting(&calls, Duration::ZERO)).spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut settings = Settings::default();
        settings.polling.interval_ms = 2000.0;
        apply_intervals(&poller, &settings);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
