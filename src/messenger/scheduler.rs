use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::Transport;
use crate::bot_logic::models::{Envelope, Scheduled};

struct Pending {
    due: Instant,
    seq: u64,
    envelope: Envelope,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Envelopes waiting for their due time. Entries with the same due time come
/// out in insertion order.
#[derive(Default)]
pub struct DeliveryQueue {
    pending: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
}

impl DeliveryQueue {
    pub fn push(&mut self, envelope: Envelope, due: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Reverse(Pending { due, seq, envelope }));
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.peek().map(|Reverse(p)| p.due)
    }

    /// Removes and returns everything due at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Envelope> {
        let mut due = Vec::new();
        while self.next_due().is_some_and(|d| d <= now) {
            if let Some(Reverse(pending)) = self.pending.pop() {
                due.push(pending.envelope);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Splits due envelopes per recipient, keeping queue order inside each group.
/// A group is sent in sequence; different recipients go out concurrently.
fn group_by_recipient(ready: Vec<Envelope>) -> Vec<Vec<Envelope>> {
    let mut groups: Vec<Vec<Envelope>> = Vec::new();
    for envelope in ready {
        match groups.iter_mut().find(|g| g[0].recipient == envelope.recipient) {
            Some(group) => group.push(envelope),
            None => groups.push(vec![envelope]),
        }
    }
    groups
}

/// Handle used by the event loop to queue replies.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Scheduled>,
}

impl Scheduler {
    pub fn schedule(&self, batch: Vec<Scheduled>) {
        for item in batch {
            if self.tx.send(item).is_err() {
                warn!("delivery loop stopped; dropping scheduled message");
                return;
            }
        }
    }
}

/// Starts the delivery loop. Each send runs as a detached task once its due
/// time passes; results are only logged. The loop ends after every
/// `Scheduler` handle is dropped and the queue has drained.
pub fn spawn_delivery_loop<T>(transport: Arc<T>) -> (Scheduler, JoinHandle<()>)
where
    T: Transport + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_delivery_loop(transport, rx));
    (Scheduler { tx }, handle)
}

async fn run_delivery_loop<T>(transport: Arc<T>, mut rx: mpsc::UnboundedReceiver<Scheduled>)
where
    T: Transport + 'static,
{
    let mut queue = DeliveryQueue::default();
    let mut open = true;

    loop {
        if !open && queue.is_empty() {
            break;
        }
        let next_due = queue.next_due();

        tokio::select! {
            received = rx.recv(), if open => match received {
                Some(item) => {
                    let now = Instant::now();
                    queue.push(item.envelope, now + item.delay);
                    // take the rest of the batch so equal due times pop together
                    while let Ok(item) = rx.try_recv() {
                        queue.push(item.envelope, now + item.delay);
                    }
                }
                None => open = false,
            },
            _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                let ready = queue.pop_due(Instant::now());
                debug!(count = ready.len(), remaining = queue.len(), "delivering due messages");
                for group in group_by_recipient(ready) {
                    let transport = Arc::clone(&transport);
                    tokio::spawn(async move {
                        for envelope in group {
                            if let Err(err) = transport.deliver(&envelope).await {
                                warn!(recipient = ?envelope.recipient, error = %err, "message delivery failed");
                            }
                        }
                    });
                }
            }
        }
    }
}
