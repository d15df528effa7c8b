//! Hand-off from the dispatching thread to plugin-owned async tasks.
//!
//! Handlers run on the engine's control loop and must return quickly. A
//! plugin with slow work publishes the event here and processes it on a
//! task that subscribes to the channel.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::plugin::EventHandler;

/// Non-blocking broadcast channel a plugin owns for its background work.
pub struct BroadcastHandoff<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> BroadcastHandoff<T> {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// losing the oldest events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Send without waiting. Returns the number of subscribers that will
    /// see the value; zero when nobody is listening.
    pub fn publish(&self, value: T) -> usize {
        send_or_drop(&self.sender, value)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Handler that maps each event to an optional value and publishes it.
    pub fn forwarder<E, F>(&self, map: F) -> impl EventHandler<E> + 'static
    where
        E: 'static,
        F: Fn(&E) -> Option<T> + Send + Sync + 'static,
    {
        let sender = self.sender.clone();
        move |event: &E| -> anyhow::Result<()> {
            if let Some(value) = map(event) {
                send_or_drop(&sender, value);
            }
            Ok(())
        }
    }
}

impl<T> Clone for BroadcastHandoff<T> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

fn send_or_drop<T>(sender: &broadcast::Sender<T>, value: T) -> usize {
    match sender.send(value) {
        Ok(receivers) => receivers,
        Err(_) => {
            debug!("Hand-off has no subscribers, value dropped");
            0
        }
    }
}

/// Receive the next value, skipping over any the receiver lagged past.
/// Returns `None` once every sender is gone.
pub async fn recv_skipping_lag<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match receiver.recv().await {
            Ok(value) => return Some(value),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Hand-off subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
