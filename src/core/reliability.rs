//! The reliability layer: RTT estimation and the ordered send and receive
//! queues that ACK/NACK processing operates on.
//!
//! 可靠性层：RTT估算以及ACK/NACK处理所操作的有序发送与接收队列。

pub mod recv_queue;
pub mod rtt;
pub mod send_queue;

pub use recv_queue::{Disposition, RecvQueue};
pub use rtt::RttEstimator;
pub use send_queue::{AckOutcome, DeleteOutcome, SendQueue, SentPacket};
