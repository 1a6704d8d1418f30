//! Raw-audio UDP listeners.
//!
//! Each configured endpoint gets its own OS thread blocked in `recv_from`.
//! A listener has no control channel of its own, so it reads the shared
//! enabled flag per datagram and simply discards audio while the gate is
//! closed. Socket failures end that listener only.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::buffering::{chunk::AudioChunk, AudioSender};
use crate::error::{HotwordError, Result};

/// One `(host, port, site id)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpEndpoint {
    pub host: String,
    pub port: u16,
    pub site_id: String,
}

impl UdpEndpoint {
    pub fn new(host: impl Into<String>, port: u16, site_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            site_id: site_id.into(),
        }
    }

    /// Build from command-line style string parts.
    ///
    /// # Errors
    /// `Config` if `port` is not a valid port number.
    pub fn parse(host: &str, port: &str, site_id: &str) -> Result<Self> {
        let port = port
            .parse::<u16>()
            .map_err(|_| HotwordError::Config(format!("invalid UDP port {port:?}")))?;
        Ok(Self::new(host, port, site_id))
    }

    /// Host with any IPv6 brackets removed, ready for `ToSocketAddrs`.
    fn bare_host(&self) -> &str {
        let host = self.host.trim();
        host.strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host)
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn bind_addr(&self) -> String {
        let host = self.bare_host();
        if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

/// A bound socket waiting to be moved onto its own thread.
#[derive(Debug)]
pub struct UdpListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    site_id: String,
}

impl UdpListener {
    /// # Errors
    /// `Socket` if the address cannot be bound.
    pub fn bind(endpoint: &UdpEndpoint) -> Result<Self> {
        let addr = endpoint.bind_addr();
        let socket = UdpSocket::bind((endpoint.bare_host(), endpoint.port)).map_err(|source| {
            HotwordError::Socket {
                addr: addr.clone(),
                source,
            }
        })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| HotwordError::Socket { addr, source })?;

        Ok(Self {
            socket,
            local_addr,
            site_id: endpoint.site_id.clone(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Move the listener onto a named thread that runs until the socket
    /// fails or the detection loop goes away.
    pub fn spawn(
        self,
        sender: AudioSender,
        enabled: Arc<AtomicBool>,
        max_datagram: usize,
    ) -> Result<JoinHandle<()>> {
        let name = format!("hotword-udp-{}", self.local_addr.port());
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || self.run(&sender, &enabled, max_datagram))?;
        Ok(handle)
    }

    fn run(self, sender: &AudioSender, enabled: &AtomicBool, max_datagram: usize) {
        info!(addr = %self.local_addr, site_id = %self.site_id, "listening for audio on UDP");
        let mut buf = vec![0u8; max_datagram];

        loop {
            let len = match self.socket.recv_from(&mut buf) {
                Ok((len, _peer)) => len,
                Err(e) => {
                    error!(addr = %self.local_addr, error = %e, "UDP receive failed, listener stopping");
                    return;
                }
            };

            if !enabled.load(Ordering::Acquire) {
                continue;
            }

            let chunk = AudioChunk::new(buf[..len].to_vec(), self.site_id.as_str());
            if sender.push_audio(chunk).is_err() {
                warn!(addr = %self.local_addr, "detection loop gone, listener stopping");
                return;
            }
            debug!(site_id = %self.site_id, bytes = len, "queued UDP audio");
        }
    }
}
