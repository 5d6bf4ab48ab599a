//! Attempt persistence: a direct guarded insert plus a background worker
//! that keeps the quiz moving while inserts are pending.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mastery_core::model::AttemptRecord;
use storage::repository::ProgressRepository;
use tokio::sync::{mpsc, oneshot};

use crate::config::{DEFAULT_RECORD_BACKOFF, DEFAULT_RECORD_MAX_ATTEMPTS};
use crate::error::ServiceError;
use crate::guard::CallGuard;

/// Appends attempt records to the progress log.
#[derive(Clone)]
pub struct ProgressRecorder {
    progress: Arc<dyn ProgressRepository>,
    guard: CallGuard,
}

impl ProgressRecorder {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressRepository>, guard: CallGuard) -> Self {
        Self { progress, guard }
    }

    /// Inserts one record. No retry and no rollback of anything else.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::PersistenceFailed`, `Timeout` or `Cancelled`.
    pub async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), ServiceError> {
        self.guard
            .run(self.progress.append_attempt(record))
            .await
            .map_err(|e| e.into_persist())
    }
}

/// How hard the worker tries before giving up on a record.
///
/// Only failures that are safe to resend are retried; timeouts and
/// permanent store errors are reported after the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before try `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECORD_MAX_ATTEMPTS,
            backoff: DEFAULT_RECORD_BACKOFF,
        }
    }
}

/// A record the worker gave up on.
#[derive(Debug)]
pub struct FailedAttempt {
    pub record: AttemptRecord,
    pub error: ServiceError,
    pub tries: u32,
}

impl FailedAttempt {
    /// False when the insert timed out and may have been stored anyway.
    #[must_use]
    pub fn known_unsaved(&self) -> bool {
        !matches!(self.error, ServiceError::Timeout(_))
    }
}

/// Outcome of every record processed since the previous flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub persisted: usize,
    pub failed: Vec<FailedAttempt>,
}

impl FlushReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Records that can be handed back to [`RecorderHandle::enqueue`].
    #[must_use]
    pub fn failed_records(&self) -> Vec<AttemptRecord> {
        self.failed.iter().map(|f| f.record.clone()).collect()
    }
}

enum Command {
    Record(AttemptRecord),
    Flush(oneshot::Sender<FlushReport>),
}

/// Sender side of the background recorder.
///
/// Records are written in the order they were enqueued. Clones feed the same
/// worker; the worker stops once every handle is dropped and the queue is
/// empty.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::UnboundedSender<Command>,
    in_flight: Arc<AtomicUsize>,
}

impl RecorderHandle {
    /// Spawns the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(recorder: ProgressRecorder, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let worker = Worker {
            recorder,
            policy,
            in_flight: Arc::clone(&in_flight),
            report: FlushReport::default(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx, in_flight }
    }

    /// Queues `record` and returns without waiting for the insert.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RecorderStopped` if the worker has exited.
    pub fn enqueue(&self, record: AttemptRecord) -> Result<(), ServiceError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Command::Record(record)).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(ServiceError::RecorderStopped);
        }
        Ok(())
    }

    /// Records queued or being written right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until everything queued before this call is settled.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RecorderStopped` if the worker has exited.
    pub async fn flush(&self) -> Result<FlushReport, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .map_err(|_| ServiceError::RecorderStopped)?;
        rx.await.map_err(|_| ServiceError::RecorderStopped)
    }

    /// Flushes and releases this handle.
    ///
    /// # Errors
    ///
    /// See [`Self::flush`].
    pub async fn close(self) -> Result<FlushReport, ServiceError> {
        self.flush().await
    }
}

struct Worker {
    recorder: ProgressRecorder,
    policy: RetryPolicy,
    in_flight: Arc<AtomicUsize>,
    report: FlushReport,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Record(record) => {
                    self.persist(record).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                Command::Flush(reply) => {
                    let report = std::mem::take(&mut self.report);
                    let _ = reply.send(report);
                }
            }
        }
        if !self.report.is_clean() {
            tracing::warn!(
                failed = self.report.failed.len(),
                "progress recorder stopped with unreported failures"
            );
        }
    }

    async fn persist(&mut self, record: AttemptRecord) {
        let max = self.policy.max_attempts.max(1);
        let mut tries = 0;
        loop {
            tries += 1;
            match self.recorder.record_attempt(&record).await {
                Ok(()) => {
                    tracing::debug!(
                        user = %record.user_id,
                        question = %record.question_id,
                        correct = record.is_correct,
                        tries,
                        "attempt recorded"
                    );
                    self.report.persisted += 1;
                    return;
                }
                Err(error) => {
                    if tries < max && error.is_safe_to_resend() {
                        tracing::debug!(tries, error = %error, "retrying attempt insert");
                        tokio::time::sleep(self.policy.backoff * tries).await;
                        continue;
                    }
                    if matches!(error, ServiceError::Timeout(_)) {
                        tracing::warn!(
                            user = %record.user_id,
                            question = %record.question_id,
                            error = %error,
                            "attempt insert timed out; it may or may not have been stored"
                        );
                    } else {
                        tracing::warn!(
                            user = %record.user_id,
                            question = %record.question_id,
                            tries,
                            error = %error,
                            "attempt not recorded"
                        );
                    }
                    self.report.failed.push(FailedAttempt {
                        record,
                        error,
                        tries,
                    });
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mastery_core::model::{Domain, Question, QuestionId, UserId};
    use mastery_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, QuestionRepository, StorageError};

    use super::*;

    fn guard() -> CallGuard {
        CallGuard::new(Duration::from_secs(1))
    }

    async fn repo_with_question() -> (InMemoryRepository, QuestionId) {
        let repo = InMemoryRepository::new();
        let q = Question::new(
            QuestionId::random(),
            "Q",
            ["a".into(), "b".into(), "c".into(), "d".into()],
            "A",
            "",
            Domain::Verbal,
            "",
        )
        .unwrap();
        repo.upsert_question(&q).await.unwrap();
        (repo, q.id())
    }

    #[tokio::test]
    async fn direct_record_surfaces_store_errors() {
        let repo = InMemoryRepository::new();
        let recorder = ProgressRecorder::new(Arc::new(repo), guard());
        let rec = AttemptRecord::new(UserId::random(), QuestionId::random(), true, fixed_now());
        let err = recorder.record_attempt(&rec).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PersistenceFailed(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn worker_persists_in_order() {
        let (repo, qid) = repo_with_question().await;
        let user = UserId::random();
        let handle = RecorderHandle::spawn(
            ProgressRecorder::new(Arc::new(repo.clone()), guard()),
            RetryPolicy::default(),
        );

        for correct in [true, false, true] {
            handle
                .enqueue(AttemptRecord::new(user, qid, correct, fixed_now()))
                .unwrap();
        }
        let report = handle.flush().await.unwrap();

        assert_eq!(report.persisted, 3);
        assert!(report.is_clean());
        assert_eq!(handle.in_flight(), 0);
        let flags: Vec<_> = repo.attempts().unwrap().iter().map(|a| a.is_correct).collect();
        assert_eq!(flags, [true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_reports_records_it_gave_up_on() {
        let repo = InMemoryRepository::new();
        let handle = RecorderHandle::spawn(
            ProgressRecorder::new(Arc::new(repo), guard()),
            RetryPolicy {
                max_attempts: 2,
                backoff: Duration::from_millis(10),
            },
        );
        let rec = AttemptRecord::new(UserId::random(), QuestionId::random(), false, fixed_now());
        handle.enqueue(rec.clone()).unwrap();

        let report = handle.close().await.unwrap();
        assert_eq!(report.persisted, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].known_unsaved());
        assert_eq!(report.failed_records(), vec![rec]);
    }

    /// Store that commits every insert and then stalls before answering.
    struct SlowCommit {
        stored: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ProgressRepository for SlowCommit {
        async fn append_attempt(&self, _attempt: &AttemptRecord) -> Result<(), StorageError> {
            self.stored.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn count_attempts(&self, _user_id: UserId) -> Result<u64, StorageError> {
            Ok(self.stored.load(Ordering::SeqCst) as u64)
        }
    }

    /// Store whose inserts always violate the question foreign key.
    struct MissingQuestion {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ProgressRepository for MissingQuestion {
        async fn append_attempt(&self, _attempt: &AttemptRecord) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::NotFound)
        }

        async fn count_attempts(&self, _user_id: UserId) -> Result<u64, StorageError> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_insert_is_not_sent_again() {
        let store = Arc::new(SlowCommit {
            stored: AtomicUsize::new(0),
        });
        let handle = RecorderHandle::spawn(
            ProgressRecorder::new(store.clone(), guard()),
            RetryPolicy::default(),
        );
        handle
            .enqueue(AttemptRecord::new(UserId::random(), QuestionId::random(), true, fixed_now()))
            .unwrap();

        let report = handle.close().await.unwrap();
        assert_eq!(store.stored.load(Ordering::SeqCst), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].tries, 1);
        assert!(matches!(report.failed[0].error, ServiceError::Timeout(_)));
        assert!(!report.failed[0].known_unsaved());
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_store_errors_are_tried_once() {
        let store = Arc::new(MissingQuestion {
            calls: AtomicUsize::new(0),
        });
        let handle = RecorderHandle::spawn(
            ProgressRecorder::new(store.clone(), guard()),
            RetryPolicy::default(),
        );
        handle
            .enqueue(AttemptRecord::new(UserId::random(), QuestionId::random(), false, fixed_now()))
            .unwrap();

        let report = handle.close().await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.failed[0].tries, 1);
        assert!(matches!(
            report.failed[0].error,
            ServiceError::PersistenceFailed(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn flush_resets_the_report() {
        let (repo, qid) = repo_with_question().await;
        let handle = RecorderHandle::spawn(
            ProgressRecorder::new(Arc::new(repo), guard()),
            RetryPolicy::default(),
        );
        handle
            .enqueue(AttemptRecord::new(UserId::random(), qid, true, fixed_now()))
            .unwrap();
        assert_eq!(handle.flush().await.unwrap().persisted, 1);
        assert_eq!(handle.flush().await.unwrap().persisted, 0);
    }
}
