//! Fixed-rate tick scheduler
//!
//! Runs on its own task and is driven by two commands (`Start`, `Stop`). While
//! started it emits one [`Tick`] per period on a capacity-1 channel. A tick the
//! receiver has not consumed yet is dropped instead of queued, so a slow
//! consumer never builds a backlog.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickCommand {
    Start,
    Stop,
}

/// Payload-free periodic signal; `sequence` only helps debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub sequence: u64,
}

pub struct TickScheduler {
    period: Duration,
    commands: mpsc::UnboundedSender<TickCommand>,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Spawn the scheduler task (stopped) and return it with its tick receiver
    pub fn spawn(period: Duration) -> (Self, mpsc::Receiver<Tick>) {
        let period = period.max(Duration::from_millis(1));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run(
            period,
            command_rx,
            tick_tx,
            Arc::clone(&running),
            shutdown.clone(),
        ));

        let scheduler = TickScheduler {
            period,
            commands,
            running,
            shutdown,
            task: Some(task),
        };
        (scheduler, tick_rx)
    }

    /// Begin emitting ticks. Restarts the timer if already running.
    pub fn start(&self) {
        let _ = self.commands.send(TickCommand::Start);
    }

    pub fn stop(&self) {
        let _ = self.commands.send(TickCommand::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the timer and wait for the scheduler task to exit
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.running.store(false, Ordering::Release);
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    period: Duration,
    mut commands: mpsc::UnboundedReceiver<TickCommand>,
    ticks: mpsc::Sender<Tick>,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let mut timer: Option<Interval> = None;
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(TickCommand::Start) => {
                    // Replacing the interval keeps exactly one timer alive
                    let mut interval = interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    timer = Some(interval);
                    running.store(true, Ordering::Release);
                }
                Some(TickCommand::Stop) => {
                    timer = None;
                    running.store(false, Ordering::Release);
                }
                None => break,
            },
            _ = next_tick(&mut timer) => {
                sequence += 1;
                match ticks.try_send(Tick { sequence }) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => {
                        debug!("TickScheduler: receiver dropped, stopping");
                        break;
                    }
                }
            }
        }
    }

    running.store(false, Ordering::Release);
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
