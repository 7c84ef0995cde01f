//! Shared trigger queue: many producers, one consumer, periodic timeout.

use std::time::Duration;

use ipo_core::Trigger;
use tokio::sync::mpsc;

pub type TriggerSender = mpsc::UnboundedSender<Trigger>;

pub struct EventQueue {
    // Held so the channel never closes while the consumer is alive.
    tx: TriggerSender,
    rx: mpsc::UnboundedReceiver<Trigger>,
    max_interval: Duration,
}

impl EventQueue {
    pub fn new(max_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, max_interval }
    }

    /// Producer handle for an event source.
    pub fn sender(&self) -> TriggerSender {
        self.tx.clone()
    }

    /// Next queued trigger in FIFO order, or `Trigger::Timeout` when nothing
    /// arrives within the max interval.
    pub async fn next(&mut self) -> Trigger {
        match tokio::time::timeout(self.max_interval, self.rx.recv()).await {
            Ok(Some(t)) => t,
            Ok(None) | Err(_) => Trigger::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipo_core::ResourceChange;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn synthesizes_timeout_when_idle() {
        let mut q = EventQueue::new(Duration::from_secs(900));
        let started = Instant::now();
        assert_eq!(q.next().await, Trigger::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_in_enqueue_order() {
        let mut q = EventQueue::new(Duration::from_secs(2));
        let a = q.sender();
        let b = q.sender();
        let change = |n: &str| Trigger::Subscription(ResourceChange::Applied { namespace: None, name: n.to_string() });
        a.send(change("1")).expect("send");
        b.send(change("2")).expect("send");
        a.send(change("3")).expect("send");

        let started = Instant::now();
        assert_eq!(q.next().await, change("1"));
        assert_eq!(q.next().await, change("2"));
        assert_eq!(q.next().await, change("3"));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(q.next().await, Trigger::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn event_before_deadline_wins() {
        let mut q = EventQueue::new(Duration::from_secs(10));
        let tx = q.sender();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            let _ = tx.send(Trigger::Subscription(ResourceChange::Restarted { count: 0 }));
        });
        assert_eq!(q.next().await, Trigger::Subscription(ResourceChange::Restarted { count: 0 }));
    }
}
