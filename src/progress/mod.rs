//! Per-request progress relay between the agent worker and the stream
//! handler.
//!
//! Every request gets a fresh channel pair; relay state never crosses
//! requests. The worker emits human-readable status lines while a long
//! agent invocation runs; the single consumer drains them into the SSE
//! response, producing heartbeats whenever nothing arrives within the
//! polling interval so intermediate proxies keep the connection open.

use std::time::Duration;

use tokio::sync::mpsc;

/// Polling interval after which the consumer produces a heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Event carried over the relay.
#[derive(Clone, Debug, Eq, PartialEq)]
enum RelayEvent {
    Progress(String),
    Done,
}

/// What the consumer observed within one polling interval.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Drained {
    /// A progress message, in emission order.
    Message(String),
    /// Nothing arrived within the interval; keep the connection alive.
    Heartbeat,
    /// The producer signaled completion (or went away). Stop draining.
    Finished,
}

/// Producer half, held by the agent worker for one request.
#[derive(Clone, Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl ProgressSender {
    /// Emit a progress message. Silently dropped when the consumer is
    /// gone, so workers never fail on a closed stream.
    pub fn emit(&self, message: impl Into<String>) {
        let _ = self.tx.send(RelayEvent::Progress(message.into()));
    }

    /// Signal that the invocation completed, successfully or not.
    pub fn done(&self) {
        let _ = self.tx.send(RelayEvent::Done);
    }
}

/// Consumer half, held by the request handler.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<RelayEvent>,
}

impl ProgressReceiver {
    /// Wait up to `interval` for the next event.
    ///
    /// A dropped producer counts as `Finished`, so a worker that dies
    /// without calling [`ProgressSender::done`] can never strand the
    /// consumer.
    pub async fn next_or_heartbeat(&mut self, interval: Duration) -> Drained {
        match tokio::time::timeout(interval, self.rx.recv()).await {
            Ok(Some(RelayEvent::Progress(message))) => Drained::Message(message),
            Ok(Some(RelayEvent::Done)) | Ok(None) => Drained::Finished,
            Err(_) => Drained::Heartbeat,
        }
    }
}

/// Create an isolated relay for one request.
#[must_use]
pub fn relay() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_arrive_in_emission_order_then_finish() {
        let (sender, mut receiver) = relay();
        sender.emit("Searching knowledge base...");
        sender.emit("Found 3 relevant documents");
        sender.emit("Generating HTML...");
        sender.done();

        let mut seen = Vec::new();
        loop {
            match receiver.next_or_heartbeat(HEARTBEAT_INTERVAL).await {
                Drained::Message(message) => seen.push(message),
                Drained::Heartbeat => continue,
                Drained::Finished => break,
            }
        }
        assert_eq!(
            seen,
            vec![
                "Searching knowledge base...",
                "Found 3 relevant documents",
                "Generating HTML...",
            ]
        );
    }

    #[tokio::test]
    async fn idle_producer_yields_heartbeats_without_losing_messages() {
        let (sender, mut receiver) = relay();

        let worker = tokio::spawn(async move {
            sender.emit("early");
            tokio::time::sleep(Duration::from_millis(40)).await;
            sender.emit("late");
            sender.done();
        });

        let mut messages = Vec::new();
        let mut heartbeats = 0;
        loop {
            match receiver.next_or_heartbeat(Duration::from_millis(10)).await {
                Drained::Message(message) => messages.push(message),
                Drained::Heartbeat => heartbeats += 1,
                Drained::Finished => break,
            }
        }
        worker.await.unwrap();

        assert_eq!(messages, vec!["early", "late"]);
        assert!(heartbeats >= 1, "gap should have produced heartbeats");
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_finished() {
        let (sender, mut receiver) = relay();
        drop(sender);
        assert_eq!(
            receiver.next_or_heartbeat(HEARTBEAT_INTERVAL).await,
            Drained::Finished
        );
    }

    #[tokio::test]
    async fn relays_are_isolated_per_request() {
        let (sender_a, mut receiver_a) = relay();
        let (_sender_b, mut receiver_b) = relay();

        sender_a.emit("for a only");
        sender_a.done();

        assert_eq!(
            receiver_a.next_or_heartbeat(HEARTBEAT_INTERVAL).await,
            Drained::Message("for a only".to_string())
        );
        assert_eq!(
            receiver_b.next_or_heartbeat(Duration::from_millis(10)).await,
            Drained::Heartbeat
        );
    }
}
