use crate::{
    config::RelayConfig,
    dns::HEADER_LEN,
    relay::{Outbounds, Relay, RelayStats, Target},
};
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// The two UDP sockets the relay sits between.
#[derive(Debug)]
pub struct RelayServer {
    client: UdpSocket,
    upstream: UdpSocket,
    upstream_addr: SocketAddr,
    recv_buffer_size: usize,
}

impl RelayServer {
    /// Bind the client-facing socket at `bind_addr` and the upstream socket
    /// at an ephemeral port.
    pub async fn bind(config: &RelayConfig) -> io::Result<Self> {
        let client = UdpSocket::bind(config.bind_addr).await?;
        let upstream = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
        info!(
            "DNS relay listening on {}, forwarding to {}",
            client.local_addr()?,
            config.upstream_addr
        );
        Ok(Self {
            client,
            upstream,
            upstream_addr: config.upstream_addr,
            recv_buffer_size: config.recv_buffer_size,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.client.local_addr()
    }

    pub fn upstream_local_addr(&self) -> io::Result<SocketAddr> {
        self.upstream.local_addr()
    }

    /// Serve until the shutdown signal fires, returning the final counters.
    pub async fn run(
        self,
        mut relay: Relay,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> io::Result<RelayStats> {
        let mut client_buf = vec![0u8; self.recv_buffer_size];
        let mut upstream_buf = vec![0u8; self.recv_buffer_size];

        loop {
            let outbounds = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("DNS relay received shutdown signal");
                    break;
                }

                result = self.client.recv_from(&mut client_buf) => {
                    match result {
                        Ok((len, src_addr)) => self.dispatch(&mut relay, &client_buf[..len], src_addr),
                        Err(e) => {
                            // ICMP port unreachable surfaces here on some platforms
                            warn!("client socket receive error: {}", e);
                            continue;
                        }
                    }
                }

                result = self.upstream.recv_from(&mut upstream_buf) => {
                    match result {
                        Ok((len, src_addr)) => self.dispatch(&mut relay, &upstream_buf[..len], src_addr),
                        Err(e) => {
                            warn!("upstream socket receive error: {}", e);
                            continue;
                        }
                    }
                }
            };

            self.send_all(outbounds).await;
        }

        let stats = relay.stats();
        info!("DNS relay shutdown complete: {}", stats);
        Ok(stats)
    }

    fn dispatch(&self, relay: &mut Relay, datagram: &[u8], src_addr: SocketAddr) -> Outbounds {
        if datagram.len() < HEADER_LEN {
            trace!("ignoring {} byte datagram from {}", datagram.len(), src_addr);
            return Outbounds::new();
        }
        relay.handle_datagram(datagram, src_addr)
    }

    async fn send_all(&self, outbounds: Outbounds) {
        for outbound in outbounds {
            let (sock, dest) = match outbound.target {
                Target::Upstream => (&self.upstream, self.upstream_addr),
                Target::Client(addr) => (&self.client, addr),
            };
            match sock.send_to(&outbound.payload, dest).await {
                Ok(sent) => debug!("sent {} bytes to {}", sent, dest),
                Err(e) => warn!("failed to send {} bytes to {}: {}", outbound.payload.len(), dest, e),
            }
        }
    }
}

/// Bind according to `config` and serve until shutdown.
pub async fn run_relay(
    config: &RelayConfig,
    relay: Relay,
    shutdown_rx: broadcast::Receiver<()>,
) -> io::Result<RelayStats> {
    RelayServer::bind(config).await?.run(relay, shutdown_rx).await
}
