//! Parsing of discovery replies

use avr_eiscp::{codes, Message};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// A receiver's answer to the discovery broadcast
///
/// Reply format: `!1ECN<model>/<port>/<region>/<identifier>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub model: String,
    pub port: u16,
    pub region: String,
    /// Stable identifier (the receiver's MAC address)
    pub identifier: String,
    pub ip: IpAddr,
}

impl Announcement {
    /// Parse a discovery reply received from `ip`
    pub fn parse(ip: IpAddr, message: &Message) -> Option<Self> {
        if message.command != codes::DISCOVERY || message.parameter == codes::QUERY {
            return None;
        }

        let mut fields = message.parameter.split('/');
        let model = fields.next()?.trim();
        let port = fields.next()?.trim().parse().ok()?;
        let region = fields.next()?.trim();
        let identifier = fields.next()?.trim();

        if model.is_empty() || identifier.is_empty() {
            return None;
        }

        Some(Self {
            model: model.to_string(),
            port,
            region: region.to_string(),
            identifier: identifier.to_string(),
            ip,
        })
    }

    /// Address of the receiver's control connection
    pub fn control_address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}
