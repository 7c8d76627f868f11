//! Fans inbound updates out to per-user mailboxes.
//!
//! Each user id owns at most one mailbox and one worker task, so updates of
//! one user are handled strictly in arrival order while different users run
//! concurrently, bounded by a semaphore. Every update taken off the inbound
//! queue holds a backlog slot until it has been handled; with the backlog
//! full, updates stay in the bounded inbound queue.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::telegram::Update;

#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn handle(&self, update: Update);
}

/// An update waiting in a mailbox, with the backlog slot it occupies.
struct Pending {
    update: Update,
    slot: OwnedSemaphorePermit,
}

type Mailboxes = DashMap<i64, mpsc::UnboundedSender<Pending>>;

pub struct Dispatcher<H> {
    handler: Arc<H>,
    mailboxes: Arc<Mailboxes>,
    permits: Arc<Semaphore>,
    backlog: Arc<Semaphore>,
}

impl<H> Clone for Dispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            mailboxes: self.mailboxes.clone(),
            permits: self.permits.clone(),
            backlog: self.backlog.clone(),
        }
    }
}

impl<H: UpdateHandler> Dispatcher<H> {
    /// `concurrency` bounds handlers running at once; `max_pending` bounds
    /// updates taken off the inbound queue but not yet handled.
    pub fn new(handler: Arc<H>, concurrency: usize, max_pending: usize) -> Self {
        Self {
            handler,
            mailboxes: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            backlog: Arc::new(Semaphore::new(max_pending.max(1))),
        }
    }

    /// Number of users with queued or in-flight updates.
    pub fn active_mailboxes(&self) -> usize {
        self.mailboxes.len()
    }

    /// Consumes the inbound queue until every sender is dropped. A backlog
    /// slot is taken before each receive, so slow handlers apply
    /// backpressure to the queue's producers.
    pub async fn run(self, mut queue: mpsc::Receiver<Update>) {
        loop {
            let Ok(slot) = self.backlog.clone().acquire_owned().await else {
                break;
            };
            let Some(update) = queue.recv().await else {
                break;
            };
            self.dispatch(update, slot);
        }
        tracing::info!("update queue closed, dispatcher stopped");
    }

    fn dispatch(&self, update: Update, slot: OwnedSemaphorePermit) {
        let Some(user_id) = update.sender_id() else {
            tracing::debug!(update_id = update.update_id, "update without sender ignored");
            return;
        };
        let pending = Pending { update, slot };

        // The entry guard holds the shard lock, so a draining worker cannot
        // remove the mailbox between our lookup and the send.
        match self.mailboxes.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                if let Err(mpsc::error::SendError(pending)) = occupied.get().send(pending) {
                    // Worker died (handler panic); start a fresh one.
                    tracing::warn!(user_id, "replacing dead mailbox worker");
                    let tx = self.spawn_worker(user_id, pending);
                    occupied.insert(tx);
                }
            }
            Entry::Vacant(vacant) => {
                let tx = self.spawn_worker(user_id, pending);
                vacant.insert(tx);
            }
        }
    }

    fn spawn_worker(&self, user_id: i64, first: Pending) -> mpsc::UnboundedSender<Pending> {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this send cannot fail.
        let _ = tx.send(first);
        tokio::spawn(drain_mailbox(
            user_id,
            rx,
            self.handler.clone(),
            self.mailboxes.clone(),
            self.permits.clone(),
        ));
        tx
    }
}

async fn drain_mailbox<H: UpdateHandler>(
    user_id: i64,
    mut rx: mpsc::UnboundedReceiver<Pending>,
    handler: Arc<H>,
    mailboxes: Arc<Mailboxes>,
    permits: Arc<Semaphore>,
) {
    loop {
        while let Ok(Pending { update, slot }) = rx.try_recv() {
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            handler.handle(update).await;
            drop(slot);
        }

        // Removal and the emptiness check happen under the shard lock that
        // `dispatch` takes before sending.
        let removed = mailboxes
            .remove_if(&user_id, |_, _| rx.is_empty())
            .is_some();
        if removed || (rx.is_empty() && !mailboxes.contains_key(&user_id)) {
            return;
        }
    }
}
