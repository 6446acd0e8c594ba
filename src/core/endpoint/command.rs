//! Defines the commands sent from the `Stream` handle to the `Endpoint` task.
use crate::error::Result;
use bytes::Bytes;
use tokio::sync::oneshot;

/// Commands sent from the `Stream` handle to the `Endpoint` task.
///
/// 从 `Stream` 句柄发送到 `Endpoint` 任务的命令。
#[derive(Debug)]
pub enum StreamCommand {
    /// Queue one message. `reply` learns whether it entered the send queue;
    /// writers that do not wait pass `None`.
    /// 排入一条消息。`reply` 得知其是否进入发送队列；不等待的写入方传入 `None`。
    Send {
        payload: Bytes,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Close once everything queued has been acknowledged.
    /// 在所有已排队内容都被确认后关闭。
    Finish {
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Close now, discarding anything unacknowledged.
    /// 立即关闭，丢弃所有未确认的内容。
    Close,
}
