//! The unbounded announce pump.
//!
//! Submission must never block, no matter how saturated the worker pool
//! is. The pump presents an unbounded intake over the bounded worker
//! feed: callers push into an unbounded queue, and a forwarder task is
//! the only place that ever waits on the feed. The `Stop` sentinel ends
//! the forwarder, which closes the feed and lets workers drain out.

use tokio::sync::mpsc;
use tracing::debug;

use cairn_cluster::EventAnnounce;

/// One direction of the announce pipeline.
pub(crate) struct AnnouncePump {
    intake: mpsc::UnboundedSender<EventAnnounce>,
}

/// Cloneable submission handle into a pump.
#[derive(Clone)]
pub(crate) struct PumpHandle {
    intake: mpsc::UnboundedSender<EventAnnounce>,
}

impl PumpHandle {
    /// Submit an event. Never blocks; events submitted after shutdown
    /// are dropped.
    pub(crate) fn submit(&self, event: EventAnnounce) {
        let _ = self.intake.send(event);
    }
}

impl AnnouncePump {
    /// Start a pump. Returns the pump and the bounded worker feed it
    /// drains into.
    pub(crate) fn new(feed_capacity: usize) -> (Self, mpsc::Receiver<EventAnnounce>) {
        let (intake, mut queue) = mpsc::unbounded_channel::<EventAnnounce>();
        let (feed_tx, feed_rx) = mpsc::channel(feed_capacity);
        tokio::spawn(async move {
            while let Some(event) = queue.recv().await {
                if matches!(event, EventAnnounce::Stop) {
                    break;
                }
                if feed_tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("announce pump drained");
            // feed_tx drops here, closing the worker feed
        });
        (Self { intake }, feed_rx)
    }

    /// A cloneable submission handle.
    pub(crate) fn handle(&self) -> PumpHandle {
        PumpHandle {
            intake: self.intake.clone(),
        }
    }

    /// Submit an event. Never blocks.
    pub(crate) fn submit(&self, event: EventAnnounce) {
        let _ = self.intake.send(event);
    }

    /// Terminate the forwarder. Events already queued are still
    /// forwarded; later submissions are dropped.
    pub(crate) fn stop(&self) {
        let _ = self.intake.send(EventAnnounce::Stop);
    }
}
