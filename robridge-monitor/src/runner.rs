//! Tokio driver for the reassembler
//!
//! One task owns the [`Reassembler`]. It waits on the fragment channel and on
//! the machine's single deadline, so a burst of fragments only ever moves one
//! timer. Promotions are published through a `watch` channel.

use crate::reassembler::{PromotedScan, Reassembler, ReassemblerConfig, ScanFragment};
use crate::MonitorError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

const COMMAND_BUFFER: usize = 64;

enum Command {
    Fragment(ScanFragment),
    Reset,
}

/// Handle for feeding the runner and watching its promotions
#[derive(Clone)]
pub struct ReassemblerHandle {
    commands: mpsc::Sender<Command>,
    latest: watch::Receiver<Option<PromotedScan>>,
}

impl ReassemblerHandle {
    pub async fn submit(&self, fragment: ScanFragment) -> Result<(), MonitorError> {
        self.commands
            .send(Command::Fragment(fragment))
            .await
            .map_err(|_| MonitorError::RunnerStopped)
    }

    /// Clear the buffer and any cool-down
    pub async fn reset(&self) -> Result<(), MonitorError> {
        self.commands
            .send(Command::Reset)
            .await
            .map_err(|_| MonitorError::RunnerStopped)
    }

    /// Receiver that observes every promotion
    pub fn promotions(&self) -> watch::Receiver<Option<PromotedScan>> {
        self.latest.clone()
    }

    /// Most recently promoted scan
    pub fn latest(&self) -> Option<PromotedScan> {
        self.latest.borrow().clone()
    }
}

/// Start the runner task
///
/// The task ends once every [`ReassemblerHandle`] has been dropped.
pub fn spawn(config: ReassemblerConfig) -> (ReassemblerHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let (tx, latest) = watch::channel(None);
    let task = tokio::spawn(run(Reassembler::new(config), rx, tx));
    (ReassemblerHandle { commands, latest }, task)
}

async fn run(
    mut reassembler: Reassembler,
    mut commands: mpsc::Receiver<Command>,
    latest: watch::Sender<Option<PromotedScan>>,
) {
    loop {
        let deadline = reassembler.deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Fragment(fragment)) => {
                    reassembler.on_event(fragment, Instant::now());
                }
                Some(Command::Reset) => reassembler.reset(),
                None => break,
            },
            _ = wait_for(deadline) => {
                if let Some(scan) = reassembler.on_deadline(Instant::now()) {
                    latest.send_replace(Some(scan));
                }
            }
        }
    }
    debug!("Reassembler runner stopped");
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
