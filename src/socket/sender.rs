//! The task that owns all writes to the socket.
//!
//! 拥有所有套接字写操作的任务。

use super::{DatagramSocket, SendCommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, trace};

const MAX_BATCH_SIZE: usize = 64;

/// Writes datagrams queued by the endpoint tasks until every sender is gone.
/// Pending commands are drained in batches of up to `MAX_BATCH_SIZE` per
/// wakeup.
///
/// 写出端点任务排队的数据报，直到所有发送方都已关闭。每次唤醒最多批量处理
/// `MAX_BATCH_SIZE` 个命令。
pub async fn sender_task<S: DatagramSocket>(socket: Arc<S>, mut rx: mpsc::Receiver<SendCommand>) {
    let mut commands = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        let first = match rx.recv().await {
            Some(cmd) => cmd,
            None => return,
        };
        commands.push(first);
        while commands.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(cmd) => commands.push(cmd),
                Err(_) => break,
            }
        }

        for cmd in commands.drain(..) {
            trace!(addr = %cmd.remote_addr, len = cmd.datagram.len(), "sending datagram");
            if let Err(e) = socket.send_to(&cmd.datagram, cmd.remote_addr).await {
                error!(addr = %cmd.remote_addr, "failed to send datagram: {}", e);
            }
        }
    }
}
