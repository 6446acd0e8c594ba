//! The protocol core: the sans-IO connection state machine, the endpoint task
//! that drives it and the user-facing stream.
//! 协议核心：无IO的连接状态机、驱动它的端点任务以及面向用户的流。

pub mod connection;
pub mod endpoint;
pub mod reliability;
pub mod stream;

#[cfg(test)]
mod tests;
#[cfg(test)]
pub mod test_utils;
