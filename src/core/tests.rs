//! Tests for the sans-IO `Connection`, driven through `ConnectionPair`.

mod handshake;
mod properties;
mod retransmission;
