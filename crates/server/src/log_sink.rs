use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use store::{ConfigRepository, RecognitionLog};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Asynchronous recognition-log pipeline: a bounded in-memory queue drained
/// by one background worker.
///
/// Producers never block. When the queue is full the entry is dropped and
/// counted — recognition latency must not track database latency. Shutdown
/// is cooperative: the worker drains what it can before the deadline.
pub struct LogSink {
    tx: mpsc::Sender<RecognitionLog>,
    dropped: Arc<AtomicU64>,
    shutting_down: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogSink {
    pub fn spawn(repo: Arc<ConfigRepository>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RecognitionLog>(capacity.max(1));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let worker_flag = shutting_down.clone();
        let worker = tokio::spawn(async move {
            loop {
                match timeout(Duration::from_millis(500), rx.recv()).await {
                    Ok(Some(entry)) => persist(&repo, entry).await,
                    // Channel closed and drained.
                    Ok(None) => break,
                    Err(_) => {
                        if worker_flag.load(Ordering::Relaxed) {
                            while let Ok(entry) = rx.try_recv() {
                                persist(&repo, entry).await;
                            }
                            break;
                        }
                    }
                }
            }
            tracing::info!("log worker stopped");
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            shutting_down,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Non-blocking enqueue. Returns whether the entry was accepted.
    pub fn enqueue(&self, entry: RecognitionLog) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    app_key = %entry.app_key,
                    dropped_total = total,
                    "log queue full, dropping entry"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("log queue closed, dropping entry");
                false
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ask the worker to drain and stop, waiting up to `deadline`.
    pub async fn shutdown(&self, deadline: Duration) {
        self.shutting_down.store(true, Ordering::Relaxed);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if timeout(deadline, handle).await.is_err() {
                tracing::warn!("log worker did not drain before the shutdown deadline");
            }
        }
    }
}

async fn persist(repo: &ConfigRepository, entry: RecognitionLog) {
    if let Err(e) = repo.insert_log(&entry).await {
        tracing::error!(error = %e, app_key = %entry.app_key, "failed to persist log entry");
    } else {
        tracing::debug!(app_key = %entry.app_key, "log entry saved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn memory_repo() -> Arc<ConfigRepository> {
        let repo = ConfigRepository::connect("sqlite::memory:").await.unwrap();
        repo.ensure_schema().await.unwrap();
        Arc::new(repo)
    }

    fn entry(n: usize) -> RecognitionLog {
        RecognitionLog {
            id: 0,
            app_key: "plm".into(),
            input_text: format!("query {n}"),
            recognized_intent: Some("SEARCH_PART".into()),
            confidence: Some(0.9),
            processing_time_ms: 1.0,
            is_success: true,
            error_message: None,
            recognition_chain: "[]".into(),
            matched_rules: "[]".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn entries_are_persisted_in_background() {
        let repo = memory_repo().await;
        let sink = LogSink::spawn(repo.clone(), 100);

        for n in 0..5 {
            assert!(sink.enqueue(entry(n)));
        }
        sink.shutdown(Duration::from_secs(5)).await;

        let stats = repo.log_stats().await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(sink.dropped_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let repo = memory_repo().await;
        let sink = LogSink::spawn(repo, 1);

        // Saturate well past capacity; the worker may drain a few entries
        // concurrently, but with this burst at least one drop must occur.
        let mut accepted = 0;
        for n in 0..200 {
            if sink.enqueue(entry(n)) {
                accepted += 1;
            }
        }
        assert!(accepted < 200);
        assert!(sink.dropped_count() > 0);
        assert_eq!(accepted as u64 + sink.dropped_count(), 200);

        sink.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn shutdown_drains_pending_entries() {
        let repo = memory_repo().await;
        let sink = LogSink::spawn(repo.clone(), 100);

        for n in 0..20 {
            sink.enqueue(entry(n));
        }
        sink.shutdown(Duration::from_secs(5)).await;

        let stats = repo.log_stats().await.unwrap();
        assert_eq!(stats.total, 20);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_rejected_quietly() {
        let repo = memory_repo().await;
        let sink = LogSink::spawn(repo, 10);
        sink.shutdown(Duration::from_secs(5)).await;

        // Worker is gone; the entry is dropped without panicking. The
        // channel still has capacity so the send itself may succeed.
        sink.enqueue(entry(0));
    }
}
