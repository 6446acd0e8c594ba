//! 定时器调度器
//! Timer scheduler
//!
//! Mirrors a `TimerTable` into spawned sleeps. Each armed generation gets one
//! task that sleeps until the deadline and then posts a `TimerFired` message;
//! re-arming or clearing aborts the previous task.

use super::table::{TimerFired, TimerKind, TimerTable};
use std::collections::HashMap;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep_until};
use tracing::trace;

#[derive(Debug)]
struct Scheduled {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Delivers timer expiries of one connection as messages.
///
/// 以消息的形式投递一个连接的定时器到期事件。
#[derive(Debug)]
pub struct TimerScheduler {
    tx: mpsc::Sender<TimerFired>,
    scheduled: HashMap<TimerKind, Scheduled>,
}

impl TimerScheduler {
    /// Creates a scheduler and the receiver its expiries arrive on.
    ///
    /// 创建一个调度器及接收其到期消息的接收端。
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TimerFired>) {
        let (tx, rx) = mpsc::channel(capacity.max(TimerKind::ALL.len()));
        (
            Self {
                tx,
                scheduled: HashMap::new(),
            },
            rx,
        )
    }

    /// Brings the spawned sleeps in line with `table`. Only timers whose
    /// generation changed since the last call are touched.
    ///
    /// 使已派生的休眠任务与 `table` 保持一致。只处理自上次调用以来代数发生变化的定时器。
    pub fn sync(&mut self, table: &TimerTable) {
        for kind in TimerKind::ALL {
            let generation = table.generation(kind);
            if self
                .scheduled
                .get(&kind)
                .is_some_and(|scheduled| scheduled.generation == generation)
            {
                continue;
            }

            if let Some(task) = self.scheduled.remove(&kind).and_then(|s| s.task) {
                task.abort();
            }

            let task = table.deadline(kind).map(|deadline| {
                trace!(timer = %kind, generation, "timer scheduled");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    sleep_until(deadline).await;
                    // The receiver is gone once the connection shut down.
                    let _ = tx.send(TimerFired { kind, generation }).await;
                })
            });
            self.scheduled.insert(kind, Scheduled { generation, task });
        }
    }

    /// Aborts every pending sleep.
    ///
    /// 中止所有待定的休眠任务。
    pub fn shutdown(&mut self) {
        for (_, scheduled) in self.scheduled.drain() {
            if let Some(task) = scheduled.task {
                task.abort();
            }
        }
    }

    /// Number of sleeps still running.
    pub fn active(&self) -> usize {
        self.scheduled
            .values()
            .filter(|s| s.task.as_ref().is_some_and(|task| !task.is_finished()))
            .count()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
