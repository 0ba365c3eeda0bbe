pub mod message;
pub mod registry;
pub mod responder;

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use anyhow::{bail, Context, Result};
use shared::protocol::{DEVICE_TYPE, SSDP_PORT};
use shared::types::ServiceRegistration;
use crate::config::SsdpConfig;

pub use registry::RegistrationTable;
pub use responder::SsdpResponder;

/// Find the address this host uses to reach the multicast group.
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn detect_local_ipv4(group: Ipv4Addr) -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .context("Failed to open probe socket")?;
    socket
        .connect((group, SSDP_PORT))
        .with_context(|| format!("No route to {}", group))?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => bail!("Could not determine local IPv4 address (got {})", other),
    }
}

/// The root-device registration advertised for the camera itself
pub fn device_registration(device_uuid: &str, location: &str, config: &SsdpConfig) -> ServiceRegistration {
    let mut registration = ServiceRegistration::local(
        format!("uuid:{}::upnp:rootdevice", device_uuid),
        DEVICE_TYPE,
        location,
    );
    registration.server = config.server.clone();
    registration.cache_control = config.cache_control.clone();

    tracing::info!("Advertising {} at {}", registration.usn, location);
    registration
}
