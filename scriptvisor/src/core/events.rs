//! Event handling for keyboard, tick and supervisor events

use anyhow::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::SupervisorEvent;
use crate::supervisor::Subscription;

/// Application events
#[derive(Debug)]
pub enum Event {
    /// Tick event for periodic updates
    Tick,
    /// Keyboard event
    Key(KeyEvent),
    /// Terminal was resized, redraw
    Resize,
    /// Something happened to the worker
    Supervisor(SupervisorEvent),
}

/// Merges terminal input, ticks and supervisor events into one stream
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    stop: Arc<AtomicBool>,
}

impl EventHandler {
    /// Create a new event handler with the given tick rate in milliseconds
    pub fn new(tick_rate_ms: u64, mut subscription: Subscription) -> Self {
        let tick_rate = Duration::from_millis(tick_rate_ms);
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        // crossterm polling blocks, keep it off the async workers
        let input_tx = tx.clone();
        let input_stop = stop.clone();
        tokio::task::spawn_blocking(move || {
            let mut last_tick = std::time::Instant::now();

            while !input_stop.load(Ordering::Relaxed) {
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(Duration::ZERO);

                if event::poll(timeout).unwrap_or(false) {
                    let forwarded = match event::read() {
                        Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                            input_tx.send(Event::Key(key))
                        }
                        Ok(CrosstermEvent::Resize(..)) => input_tx.send(Event::Resize),
                        Ok(_) => Ok(()),
                        Err(_) => break,
                    };
                    if forwarded.is_err() {
                        break;
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if input_tx.send(Event::Tick).is_err() {
                        break;
                    }
                    last_tick = std::time::Instant::now();
                }
            }
        });

        tokio::spawn(async move {
            debug!(topic = ?subscription.topic(), "forwarding supervisor events");
            while let Some(event) = subscription.recv().await {
                if event.is_completion() {
                    debug!(run_id = %event.run_id(), "run completed");
                }
                if tx.send(Event::Supervisor(event)).is_err() {
                    break;
                }
            }
            subscription.unsubscribe();
        });

        Self { rx, stop }
    }

    /// Get the next event
    pub async fn next(&mut self) -> Result<Event> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("Event channel closed"))
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
