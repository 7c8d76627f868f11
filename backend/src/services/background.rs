//! Registry for the long-lived periodic loops (reconciler, janitor,
//! metrics flush).

// std::sync::Mutex: the lock is never held across an await point.
use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

#[derive(Clone)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Runs `cycle` immediately and then every `period` until shutdown. A
    /// cycle that has started always runs to completion.
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, mut cycle: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(task = name, period_secs = period.as_secs(), "background loop started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => cycle().await,
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            tracing::info!(task = name, "background loop stopped");
        });

        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((name, handle));
    }

    /// Signals every loop to stop and waits for them.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for (name, handle) in handles {
            if let Err(err) = handle.await {
                tracing::warn!(task = name, error = %err, "background loop panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn periodic_loop_runs_until_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks = BackgroundTasks::new();

        let c = counter.clone();
        tasks.spawn_periodic("counter", Duration::from_millis(5), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(tasks.len(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        tasks.shutdown().await;
        let seen = counter.load(Ordering::SeqCst);
        assert!(seen >= 2, "loop ran {} times", seen);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
        assert!(tasks.is_empty());
    }
}
