//! Terminal input and tick pump
//!
//! A dedicated thread polls crossterm with the tick period as timeout and
//! forwards key, resize, and tick messages over a channel, keeping the UI
//! runloop itself single-threaded and async-friendly.

use std::time::Duration;

use crossterm::event::{self, KeyEvent, KeyEventKind};
use eyre::Result;
use tokio::sync::mpsc;
use tracing::debug;

/// Messages driving the UI runloop
#[derive(Debug)]
pub enum UiEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    Tick,
}

/// Input/tick pump
pub struct EventPump {
    rx: mpsc::UnboundedReceiver<UiEvent>,
}

impl EventPump {
    /// Start the pump thread with the given tick period
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            debug!(?tick_rate, "EventPump: polling thread started");
            loop {
                let message = if event::poll(tick_rate).unwrap_or(false) {
                    match event::read() {
                        Ok(event::Event::Key(key)) if key.kind == KeyEventKind::Press => Some(UiEvent::Key(key)),
                        Ok(event::Event::Resize(w, h)) => Some(UiEvent::Resize(w, h)),
                        _ => None,
                    }
                } else {
                    Some(UiEvent::Tick)
                };

                if let Some(message) = message {
                    if tx.send(message).is_err() {
                        debug!("EventPump: channel closed, exiting");
                        break;
                    }
                }
            }
        });

        Self { rx }
    }

    /// Next message (async)
    pub async fn next(&mut self) -> Result<UiEvent> {
        self.rx.recv().await.ok_or_else(|| eyre::eyre!("event pump closed"))
    }
}
