//! The socket layer: one datagram socket shared by many connections.
//!
//! A `SocketActor` task reads the socket, decodes datagrams and routes the
//! packets to per-connection `Endpoint` tasks by remote address. A sender
//! task owns all writes. `QuicSocket` and `Listener` are the handles users
//! hold.
//!
//! 套接字层：多个连接共享一个数据报套接字。
//!
//! `SocketActor` 任务读取套接字、解码数据报，并按远程地址将包路由到每个连接的
//! `Endpoint` 任务。发送任务负责所有写操作。`QuicSocket` 和 `Listener` 是用户
//! 持有的句柄。

mod actor;
mod command;
mod handle;
mod sender;
mod traits;


pub use command::{SendCommand, SocketActorCommand};
pub use handle::{Listener, QuicSocket};
pub use traits::{BindableDatagramSocket, DatagramSocket};
