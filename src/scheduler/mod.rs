//! Maps a job key to a parsed Quartz cron expression and fires a supplied
//! action at each occurrence, one independent task per key.

use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

type Action = Arc<dyn Fn() -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

struct RunningJob {
    handle: JoinHandle<()>,
}

/// Owns one background task per scheduled key. Cloning shares the same table.
#[derive(Clone)]
pub struct CronScheduler {
    jobs: Arc<Mutex<HashMap<String, RunningJob>>>,
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CronScheduler {
    pub fn new() -> Self {
        Self { jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Parse `expr` under the Quartz dialect and start firing `action` at each
    /// occurrence. Replaces any prior job registered under `key`. Logs and
    /// schedules nothing if `expr` fails to parse.
    pub async fn schedule_job(&self, key: &str, expr: &str, action: Action) {
        self.cancel_job(key).await;

        let schedule = match Schedule::from_str(expr) {
            Ok(s) => s,
            Err(err) => {
                error!(key, expr, %err, "invalid cron expression, job not scheduled");
                return;
            },
        };

        let key_owned = key.to_string();
        let handle = tokio::spawn(async move {
            loop {
                let next = {
                    let now = chrono::Utc::now();
                    schedule.after(&now).next()
                };
                let Some(next_fire) = next else {
                    warn!(key = %key_owned, "cron expression has no further executions, stopping");
                    break;
                };
                let delay = (next_fire - chrono::Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
                tokio::time::sleep(delay).await;

                let fut = action();
                fut.await;
            }
        });

        self.jobs.lock().await.insert(key.to_string(), RunningJob { handle });
    }

    /// Abort the task for `key`, if any, without waiting for it to exit.
    pub async fn cancel_job(&self, key: &str) {
        if let Some(job) = self.jobs.lock().await.remove(key) {
            job.handle.abort();
        }
    }

    /// Abort the task for `key` and wait for it to finish unwinding.
    pub async fn cancel_and_join(&self, key: &str) {
        let job = self.jobs.lock().await.remove(key);
        if let Some(job) = job {
            job.handle.abort();
            let _ = job.handle.await;
        }
    }

    /// Cancel every scheduled job.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn quartz_expression_with_seconds_parses() {
        assert!(Schedule::from_str("0 */5 * * * ?").is_ok());
    }

    #[test]
    fn malformed_expression_fails_to_parse() {
        assert!(Schedule::from_str("not a cron expression").is_err());
    }

    #[tokio::test]
    async fn scheduling_twice_under_the_same_key_replaces_the_first_job() {
        let scheduler = CronScheduler::new();
        let action: Action = Arc::new(|| Box::pin(async {}));
        scheduler.schedule_job("k", "0 */5 * * * ?", action.clone()).await;
        assert_eq!(scheduler.jobs.lock().await.len(), 1);
        scheduler.schedule_job("k", "0 */5 * * * ?", action).await;
        assert_eq!(scheduler.jobs.lock().await.len(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_expression_leaves_no_job_registered() {
        let scheduler = CronScheduler::new();
        let action: Action = Arc::new(|| Box::pin(async {}));
        scheduler.schedule_job("bad", "nonsense", action).await;
        assert_eq!(scheduler.jobs.lock().await.len(), 0);
    }
}
