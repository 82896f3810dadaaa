use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;

use waypoint_core::{BoxFuture, JobId, Result, Scheduler};

struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

type TimerTable = Arc<Mutex<HashMap<JobId, PendingTimer>>>;

/// Scheduler backed by the tokio runtime.
///
/// Timers are keyed by [`JobId`]; scheduling an id again aborts the pending
/// timer. Once a timer fires it leaves the table, so a step that
/// reschedules its own id does not cancel itself.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    timers: TimerTable,
    generation: Arc<AtomicU64>,
}

impl TokioScheduler {
    /// Create a new scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids with a timer that has not fired yet.
    pub fn pending_jobs(&self) -> Vec<JobId> {
        lock(&self.timers).keys().cloned().collect()
    }

    /// Whether an id has a pending timer.
    pub fn is_pending(&self, job_id: &JobId) -> bool {
        lock(&self.timers).contains_key(job_id)
    }

    /// Abort every pending timer.
    pub fn cancel_all(&self) {
        let mut timers = lock(&self.timers);
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn run_workflow(&self, name: &str, workflow: BoxFuture<'static, Result<()>>) {
        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(e) = workflow.await {
                tracing::error!(workflow = %name, error = %e, "Workflow failed");
            }
        });
    }

    fn schedule_after(&self, delay: Duration, job_id: JobId, step: BoxFuture<'static, ()>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        // The table stays locked until the new entry is in, so a zero-delay
        // timer cannot look itself up before it is registered.
        let mut timers = lock(&self.timers);

        let table = self.timers.clone();
        let id = job_id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = lock(&table);
                match timers.get(&id) {
                    Some(timer) if timer.generation == generation => {
                        timers.remove(&id);
                    }
                    _ => return,
                }
            }
            step.await;
        });

        let replaced = timers.insert(
            job_id.clone(),
            PendingTimer {
                generation,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = replaced {
            previous.handle.abort();
            tracing::trace!(job_id = %job_id, "Replaced pending timer");
        }
    }

    fn cancel(&self, job_id: &JobId) -> bool {
        match lock(&self.timers).remove(job_id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Lock the timer table, recovering from a poisoned lock.
fn lock(timers: &TimerTable) -> MutexGuard<'_, HashMap<JobId, PendingTimer>> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use waypoint_core::{AgentId, Phase, ServiceName, WaypointError};

    fn job(phase: Phase) -> JobId {
        JobId::new(
            AgentId::from_uuid(uuid::Uuid::nil()),
            phase,
            &ServiceName::new("orders").unwrap(),
        )
    }

    fn counting_step(counter: &Arc<AtomicUsize>) -> BoxFuture<'static, ()> {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_step_runs_after_delay() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_after(Duration::from_millis(20), job(Phase::Get), counting_step(&counter));
        assert!(scheduler.is_pending(&job(Phase::Get)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(scheduler.pending_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_same_id_replaces_pending_timer() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            scheduler.schedule_after(
                Duration::from_millis(30),
                job(Phase::Get),
                counting_step(&counter),
            );
        }
        assert_eq!(scheduler.pending_jobs().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_ids_do_not_interfere() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_after(Duration::from_millis(10), job(Phase::Get), counting_step(&counter));
        scheduler.schedule_after(Duration::from_millis(10), job(Phase::Watch), counting_step(&counter));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_after(Duration::from_millis(20), job(Phase::Get), counting_step(&counter));
        assert!(scheduler.cancel(&job(Phase::Get)));
        assert!(!scheduler.cancel(&job(Phase::Get)));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_step_can_reschedule_itself() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = scheduler.clone();
        let inner_counter = counter.clone();
        scheduler.schedule_after(
            Duration::from_millis(5),
            job(Phase::Get),
            Box::pin(async move {
                inner_counter.fetch_add(1, Ordering::SeqCst);
                inner_scheduler.schedule_after(
                    Duration::from_millis(5),
                    job(Phase::Get),
                    counting_step(&inner_counter),
                );
            }),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_workflow_absorbs_errors() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();

        scheduler.run_workflow(
            "failing",
            Box::pin(async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(WaypointError::Transport("refused".into()))
            }),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
