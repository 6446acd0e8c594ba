//! An in-memory datagram network with configurable loss and delay.
use async_trait::async_trait;
use bytes::Bytes;
use kestrel_quic::{DatagramSocket, Result};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU16, AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::sync::mpsc;

type Datagram = (Bytes, SocketAddr);

pub struct SimNetwork {
    hosts: Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
    rng: Mutex<StdRng>,
    loss: Mutex<f64>,
    delay: Duration,
    next_port: AtomicU16,
    pub dropped: AtomicU64,
    pub delivered: AtomicU64,
}

impl SimNetwork {
    pub fn new(loss: f64, delay: Duration, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            hosts: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            loss: Mutex::new(loss),
            delay,
            next_port: AtomicU16::new(10_000),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        })
    }

    /// Attaches a new socket with its own address.
    pub fn socket(self: &Arc<Self>) -> SimSocket {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let (tx, rx) = mpsc::unbounded_channel();
        self.hosts.lock().unwrap().insert(addr, tx);
        SimSocket {
            addr,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        }
    }

    /// Changes the loss probability for every later datagram.
    pub fn set_loss(&self, loss: f64) {
        *self.loss.lock().unwrap() = loss;
    }

    fn route(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let loss = *self.loss.lock().unwrap();
        if self.rng.lock().unwrap().random_bool(loss) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(host) = self.hosts.lock().unwrap().get(&to).cloned() else {
            return;
        };
        self.delivered.fetch_add(1, Ordering::Relaxed);
        let datagram = (Bytes::copy_from_slice(data), from);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = host.send(datagram);
        });
    }
}

pub struct SimSocket {
    addr: SocketAddr,
    network: Arc<SimNetwork>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

#[async_trait]
impl DatagramSocket for SimSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        self.network.route(self.addr, target, buf);
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        let (data, from) = inbox
            .recv()
            .await
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionAborted))?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, from))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }
}
