use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::events::EventSender;
use crate::replay::{self, LOOP_RESTART_DELAY, ReplayScheduler};

/// Timed replay of a recorded capture file
///
/// The reader streams lines through the capture filter into the replay
/// channel; the scheduler drains the channel at the configured rate. Only
/// when the channel reports drained-and-closed does the adapter decide
/// between looping (reopen from offset zero after a short delay) and
/// terminating with a disconnect, so queued lines are never cut off early
/// and FIFO order holds across the restart boundary.
pub struct FileReplayAdapter {
    path: PathBuf,
    loop_playback: bool,
    speed: f64,
    events: EventSender,
    task: Option<JoinHandle<()>>,
    done: Arc<AtomicBool>,
    started: bool,
}

impl FileReplayAdapter {
    pub fn new(path: PathBuf, loop_playback: bool, speed: f64, events: EventSender) -> Self {
        Self {
            path,
            loop_playback,
            speed,
            events,
            task: None,
            done: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.started {
            return Ok(());
        }
        // Open before declaring the session up so a bad path fails fast
        let file = File::open(&self.path)
            .await
            .map_err(|e| TransportError::FileOpen {
                path: self.path.display().to_string(),
                source: e,
            })?;
        info!("Replaying capture file {}", self.path.display());

        self.started = true;
        self.events.connected();

        let path = self.path.clone();
        let loop_playback = self.loop_playback;
        let speed = self.speed;
        let events = self.events.clone();
        let done = Arc::clone(&self.done);
        self.task = Some(tokio::spawn(async move {
            let mut current = Some(file);
            loop {
                let file = match current.take() {
                    Some(file) => file,
                    None => match File::open(&path).await {
                        Ok(file) => file,
                        Err(e) => {
                            events.error(TransportError::FileOpen {
                                path: path.display().to_string(),
                                source: e,
                            });
                            break;
                        }
                    },
                };

                let (tx, rx) = mpsc::unbounded_channel();
                let reader = tokio::spawn(read_capture(file, tx));
                ReplayScheduler::new(rx, events.clone(), speed).drain().await;
                let _ = reader.await;

                if !loop_playback {
                    break;
                }
                debug!("capture finished, restarting from the top");
                tokio::time::sleep(LOOP_RESTART_DELAY).await;
            }
            events.disconnected_once(&done);
        }));
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.disconnected_once(&self.done);
    }
}

/// Stream a capture file into the replay channel, filtered line by line
async fn read_capture(file: File, tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(file).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(raw)) => {
                if let Some(line) = replay::filter_capture_line(&raw) {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("capture read error: {}", e);
                break;
            }
        }
    }
}
