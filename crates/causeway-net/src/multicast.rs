//! Fan-out of stamped messages to every peer.
//!
//! Each peer has its own worker task and bounded queue. Enqueueing never
//! waits: a peer whose queue is full gets a failed outcome for that message,
//! so a slow or dead peer never delays delivery to the others. Jobs for one
//! peer run in queue order.

use crate::config::{Membership, NodeConfig};
use crate::error::{NetError, Result};
use crate::peer::PeerAddr;
use crate::transport::Transport;
use causeway_clock::Message;
use futures::future::{join_all, BoxFuture};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

/// Result of posting one message to one peer.
#[derive(Debug)]
pub struct SendOutcome {
    pub peer: PeerAddr,
    pub slot: usize,
    pub result: Result<()>,
}

impl SendOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

struct Job {
    msg: Arc<Message>,
    done: oneshot::Sender<Result<()>>,
}

struct Worker {
    peer: PeerAddr,
    slot: usize,
    queue: mpsc::Sender<Job>,
}

/// Per-peer outbound workers for one node.
pub struct Multicaster {
    workers: Vec<Worker>,
}

impl Multicaster {
    /// Spawn one worker per peer in `membership`. Must run inside a Tokio
    /// runtime.
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        membership: &Membership,
        config: &NodeConfig,
    ) -> Self {
        let workers = membership
            .peers()
            .map(|(slot, peer)| {
                let (queue, rx) = mpsc::channel(config.outbound_queue.max(1));
                tokio::spawn(run_worker(
                    transport.clone(),
                    peer,
                    config.delay_for(slot),
                    rx,
                ));
                Worker { peer, slot, queue }
            })
            .collect();

        Self { workers }
    }

    pub fn peer_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `msg` for every peer without waiting on any of them.
    ///
    /// The returned report resolves when every queued post has finished.
    /// Peers whose queue is full or whose worker is gone resolve at once
    /// with an error.
    pub fn multicast(&self, msg: Message) -> MulticastReport {
        let msg = Arc::new(msg);
        let mut pending = Vec::with_capacity(self.workers.len());

        for worker in &self.workers {
            let (done, rx) = oneshot::channel();
            let job = Job {
                msg: msg.clone(),
                done,
            };
            match worker.queue.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    warn!(peer = %worker.peer, id = %msg.id(), "outbound queue full, skipping peer");
                    let _ = job
                        .done
                        .send(Err(NetError::QueueFull(worker.peer.to_string())));
                }
                Err(TrySendError::Closed(job)) => {
                    let _ = job
                        .done
                        .send(Err(NetError::WorkerClosed(worker.peer.to_string())));
                }
            }
            pending.push((worker.peer, worker.slot, rx));
        }

        MulticastReport { pending }
    }
}

async fn run_worker<T: Transport>(
    transport: Arc<T>,
    peer: PeerAddr,
    delay: Option<Duration>,
    mut jobs: mpsc::Receiver<Job>,
) {
    while let Some(job) = jobs.recv().await {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = transport.post(&peer, &job.msg).await;
        match &result {
            Ok(()) => trace!(%peer, id = %job.msg.id(), "posted"),
            Err(e) => warn!(%peer, id = %job.msg.id(), error = %e, "could not reach peer"),
        }
        // The caller may have dropped its report.
        let _ = job.done.send(result);
    }
}

/// Outstanding posts of one multicast.
pub struct MulticastReport {
    pending: Vec<(PeerAddr, usize, oneshot::Receiver<Result<()>>)>,
}

impl MulticastReport {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for every post to finish, in slot order.
    pub async fn wait(self) -> Vec<SendOutcome> {
        let outcomes = self.pending.into_iter().map(|(peer, slot, rx)| async move {
            let result = match rx.await {
                Ok(result) => result,
                Err(_) => Err(NetError::WorkerClosed(peer.to_string())),
            };
            SendOutcome { peer, slot, result }
        });
        join_all(outcomes).await
    }

    /// Wait for every post and keep only the failures.
    pub async fn failures(self) -> Vec<SendOutcome> {
        self.wait()
            .await
            .into_iter()
            .filter(|outcome| !outcome.is_ok())
            .collect()
    }
}

impl IntoFuture for MulticastReport {
    type Output = Vec<SendOutcome>;
    type IntoFuture = BoxFuture<'static, Vec<SendOutcome>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
