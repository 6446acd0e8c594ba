//! 连接定时器模块
//! Connection Timer Module
//!
//! 每个连接有四个独立的单次定时器。`TimerTable` 保存截止时间，由连接状态机
//! 同步修改；`TimerScheduler` 把截止时间变成发往连接所属任务的消息，
//! 定时器回调因此不会与前台处理交错执行。
//!
//! Every connection owns four independent one-shot timers. `TimerTable` holds
//! the deadlines and is mutated synchronously by the connection state
//! machine; `TimerScheduler` turns those deadlines into messages delivered to
//! the task that owns the connection, so a timer never runs concurrently with
//! packet or application processing.

pub mod scheduler;
pub mod table;

#[cfg(test)]
mod tests;

pub use scheduler::TimerScheduler;
pub use table::{TimerFired, TimerKind, TimerTable};
