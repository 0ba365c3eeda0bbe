use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use shared::protocol::{NTS_ALIVE, NTS_BYEBYE};
use shared::types::ServiceRegistration;
use super::message::{self, Request};
use super::registry::RegistrationTable;
use crate::config::SsdpConfig;

const RECV_BUFFER: usize = 8192;

/// UPnP caps the response window at five seconds whatever MX says
const MAX_RESPONSE_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct ResponderSettings {
    /// Longest a single receive waits before the loop comes round again
    pub poll_interval: Duration,
    pub announce_interval: Duration,
    /// Where alive/byebye frames go, normally the multicast group
    pub announce_target: SocketAddr,
}

/// A search answer waiting for its random delay to elapse
#[derive(Debug, Clone)]
pub struct ScheduledResponse {
    pub delay: Duration,
    pub registration: ServiceRegistration,
}

impl ScheduledResponse {
    /// The response datagram, dated `at`
    pub fn render(&self, at: DateTime<Utc>) -> String {
        message::build_response(&self.registration, at)
    }
}

/// Pick one response per matching registration, each with a delay drawn
/// uniformly from [0, MX] seconds.
pub fn plan_responses<R: Rng + ?Sized>(
    table: &RegistrationTable,
    search_target: &str,
    max_wait_secs: u64,
    rng: &mut R,
) -> Vec<ScheduledResponse> {
    let window_ms = max_wait_secs.min(MAX_RESPONSE_DELAY_SECS) * 1000;

    table
        .matching(search_target)
        .into_iter()
        .map(|reg| ScheduledResponse {
            delay: Duration::from_millis(rng.random_range(0..=window_ms)),
            registration: reg.clone(),
        })
        .collect()
}

/// Open a UDP socket on `bind` and join `group` on all interfaces
pub fn bind_multicast(bind: SocketAddrV4, group: Ipv4Addr) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("Failed to create SSDP socket")?;
    socket
        .set_reuse_address(true)
        .context("Failed to set SO_REUSEADDR")?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket
        .set_reuse_port(true)
        .context("Failed to set SO_REUSEPORT")?;

    socket
        .bind(&SocketAddr::V4(bind).into())
        .with_context(|| format!("Failed to bind SSDP socket to {}", bind))?;
    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .with_context(|| format!("Failed to join multicast group {}", group))?;
    socket
        .set_nonblocking(true)
        .context("Failed to make SSDP socket non-blocking")?;

    Ok(socket.into())
}

/// Answers M-SEARCH requests for the registrations it owns and announces
/// them on the multicast group.
pub struct SsdpResponder {
    socket: Arc<UdpSocket>,
    table: RegistrationTable,
    settings: ResponderSettings,
}

impl SsdpResponder {
    /// Bind to the configured port and join the configured group
    pub fn bind(config: &SsdpConfig, table: RegistrationTable) -> Result<Self> {
        let bind: SocketAddrV4 = config
            .bind
            .parse()
            .with_context(|| format!("Invalid SSDP bind address: {}", config.bind))?;

        let std_socket = bind_multicast(bind, config.multicast_group)?;
        let socket = UdpSocket::from_std(std_socket).context("Failed to register SSDP socket")?;

        let settings = ResponderSettings {
            poll_interval: config.poll_interval(),
            announce_interval: config.announce_interval(),
            announce_target: SocketAddr::V4(SocketAddrV4::new(config.multicast_group, bind.port())),
        };

        Ok(Self::with_socket(socket, table, settings))
    }

    pub fn with_socket(socket: UdpSocket, table: RegistrationTable, settings: ResponderSettings) -> Self {
        Self {
            socket: Arc::new(socket),
            table,
            settings,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Announce, serve searches until cancelled, then say byebye
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            "SSDP responder listening on {} with {} registration(s)",
            self.local_addr()?,
            self.table.len()
        );

        self.announce(NTS_ALIVE).await;

        let period = self.settings.announce_interval;
        let mut announce_interval = tokio::time::interval_at(Instant::now() + period, period);
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("SSDP responder shutting down");
                    break;
                }
                _ = announce_interval.tick() => {
                    self.announce(NTS_ALIVE).await;
                }
                received = tokio::time::timeout(self.settings.poll_interval, self.socket.recv_from(&mut buf)) => {
                    match received {
                        Err(_) => continue,
                        Ok(Ok((len, src))) => self.handle_datagram(&buf[..len], src, &cancel),
                        Ok(Err(e)) => tracing::debug!("SSDP receive error: {}", e),
                    }
                }
            }
        }

        self.announce(NTS_BYEBYE).await;
        Ok(())
    }

    fn handle_datagram(&self, data: &[u8], src: SocketAddr, cancel: &CancellationToken) {
        let request = match message::parse(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Discarding datagram from {}: {}", src, e);
                return;
            }
        };

        match request {
            Request::Search { search_target, max_wait_secs } => {
                let responses = plan_responses(
                    &self.table,
                    &search_target,
                    max_wait_secs,
                    &mut rand::rng(),
                );
                tracing::debug!(
                    "M-SEARCH from {} ST={} MX={}: {} response(s)",
                    src,
                    search_target,
                    max_wait_secs,
                    responses.len()
                );

                for response in responses {
                    self.schedule(response, src, cancel.child_token());
                }
            }
            Request::Notify => {}
        }
    }

    fn schedule(&self, response: ScheduledResponse, dest: SocketAddr, cancel: CancellationToken) {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(response.delay) => {
                    let payload = response.render(Utc::now());
                    match socket.send_to(payload.as_bytes(), dest).await {
                        Ok(_) => tracing::debug!("Sent search response for {} to {}", response.registration.usn, dest),
                        Err(e) => tracing::warn!("Failed to send search response to {}: {}", dest, e),
                    }
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Send every announceable registration twice to the announce target
    async fn announce(&self, nts: &str) {
        let default_host = self.settings.announce_target.to_string();

        for reg in self.table.announceable() {
            let frame = message::build_notify(reg, &default_host, nts);
            for _ in 0..2 {
                if let Err(e) = self
                    .socket
                    .send_to(frame.as_bytes(), self.settings.announce_target)
                    .await
                {
                    tracing::warn!("Failed to send {} for {}: {}", nts, reg.usn, e);
                }
            }
            tracing::debug!("Sent {} for {}", nts, reg.usn);
        }
    }
}
