use std::time::Duration;
use tokio::sync::mpsc;

use crate::events::EventSender;

/// Base emission interval at 1x speed
pub const BASE_INTERVAL: Duration = Duration::from_millis(100);
/// Delay before re-reading a looped capture from offset zero
pub const LOOP_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Filter one capture-file line, unwrapping multiplexed entries
///
/// Blank lines and `#` comments are dropped. A multiplexed entry has the
/// shape `<prefix>;<tag>;<payload>` with an alphanumeric prefix and a
/// one-character source tag; tag `A` unwraps to the embedded payload and
/// every other tag is discarded. This is a narrow, format-specific contract
/// kept exactly as captured files use it; anything that does not match
/// passes through as a plain protocol line.
pub fn filter_capture_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some((prefix, rest)) = line.split_once(';') {
        if let Some((tag, payload)) = rest.split_once(';') {
            if !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_alphanumeric())
                && tag.len() == 1
            {
                if tag == "A" {
                    return Some(payload.to_string());
                }
                return None;
            }
        }
    }

    Some(line.to_string())
}

/// Rate-paced drainer for queued capture lines
///
/// The queue is the receiving half of a channel whose sender belongs to the
/// file reader: reader appends, scheduler pops, nobody else touches it.
/// `recv()` returning `None` means the queue is drained *and* the reader
/// has closed, which is the only condition that counts as end-of-stream;
/// an empty queue with a live reader simply awaits more lines.
pub struct ReplayScheduler {
    rx: mpsc::UnboundedReceiver<String>,
    events: EventSender,
    delay: Option<Duration>,
}

impl ReplayScheduler {
    /// # Arguments
    /// * `rx` - Receiving half of the reader's line channel
    /// * `events` - Event emitter for `raw-message` publication
    /// * `speed` - Speed multiplier; 0 means unlimited
    pub fn new(rx: mpsc::UnboundedReceiver<String>, events: EventSender, speed: f64) -> Self {
        Self {
            rx,
            events,
            delay: pacing_delay(speed),
        }
    }

    /// Emit queued lines at the configured rate until end-of-stream
    pub async fn drain(mut self) {
        while let Some(line) = self.rx.recv().await {
            self.events.raw_message(line);
            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                // Unlimited speed: no timer, just let other tasks run
                None => tokio::task::yield_now().await,
            }
        }
    }
}

/// Per-line delay for a speed multiplier; `None` means no timer at all
pub fn pacing_delay(speed: f64) -> Option<Duration> {
    if speed <= 0.0 {
        None
    } else {
        Some(BASE_INTERVAL.div_f64(speed))
    }
}
