//! Per-job live log channel.
//!
//! Every job id gets its own broadcast topic. Lines published while nobody is
//! subscribed are dropped, and topics without receivers are pruned lazily.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LiveLog {
    topics: Arc<Mutex<HashMap<Uuid, broadcast::Sender<String>>>>,
    capacity: usize,
}

impl Default for LiveLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LiveLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Topic name observers address the channel of `job_id` by.
    pub fn topic(job_id: Uuid) -> String {
        format!("/topic/logs/job/{job_id}")
    }

    /// Subscribe to the lines of one job.
    pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<String> {
        let mut topics = self.topics.lock().unwrap_or_else(|p| p.into_inner());
        topics
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn publish(&self, job_id: Uuid, line: impl Into<String>) {
        let mut topics = self.topics.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(tx) = topics.get(&job_id) {
            if tx.send(line.into()).is_err() {
                topics.remove(&job_id);
            }
        }
    }

    /// Feeds every line of `job_id` to `sink` until [`LogFollower::finish`].
    pub fn follow<F>(&self, job_id: Uuid, mut sink: F) -> LogFollower
    where
        F: FnMut(String) + Send + 'static,
    {
        let mut rx = self.subscribe(job_id);
        let (stop, mut stopped) = oneshot::channel::<()>();
        debug!("Following {}", Self::topic(job_id));

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    received = rx.recv() => match received {
                        Ok(line) => sink(line),
                        Err(RecvError::Lagged(skipped)) => sink(format!("... {skipped} lines skipped")),
                        Err(RecvError::Closed) => return,
                    },
                    _ = &mut stopped => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(line) => sink(line),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        });
        LogFollower { stop, handle }
    }

    /// A cloneable handle bound to one job, handy to move into reader tasks.
    pub fn publisher(&self, job_id: Uuid) -> LogPublisher {
        LogPublisher {
            hub: self.clone(),
            job_id,
        }
    }
}

#[derive(Clone)]
pub struct LogPublisher {
    hub: LiveLog,
    job_id: Uuid,
}

impl LogPublisher {
    pub fn line(&self, line: impl Into<String>) {
        self.hub.publish(self.job_id, line);
    }
}

/// Background task forwarding one job's lines to a sink.
pub struct LogFollower {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl LogFollower {
    /// Stops following once every line already published has reached the sink.
    pub async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!("Live log follower ended abnormally: {}", e);
        }
    }
}
