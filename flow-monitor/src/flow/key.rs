use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// The IP protocol number carried by a flow
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Protocol(pub u8);

impl Protocol {
    pub const ICMP: Protocol = Protocol(1);
    pub const TCP: Protocol = Protocol(6);
    pub const UDP: Protocol = Protocol(17);
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Protocol::ICMP => f.write_str("ICMP"),
            Protocol::TCP => f.write_str("TCP"),
            Protocol::UDP => f.write_str("UDP"),
            Protocol(other) => write!(f, "{other}"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("`{0}` is neither a known protocol name nor a protocol number between 0 and 255")]
pub struct InvalidProtocol(String);

impl FromStr for Protocol {
    type Err = InvalidProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("tcp") {
            Ok(Protocol::TCP)
        } else if trimmed.eq_ignore_ascii_case("udp") {
            Ok(Protocol::UDP)
        } else if trimmed.eq_ignore_ascii_case("icmp") {
            Ok(Protocol::ICMP)
        } else {
            trimmed
                .parse::<u8>()
                .map(Protocol)
                .map_err(|_| InvalidProtocol(s.to_string()))
        }
    }
}

/// Identifies a uni-directional flow by its 5-tuple
///
/// Two packets belong to the same flow iff all five fields are equal, so `A -> B` and `B -> A`
/// are distinct flows.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub source_address: IpAddr,
    pub source_port: u16,
    pub destination_address: IpAddr,
    pub destination_port: u16,
    #[serde_as(as = "DisplayFromStr")]
    pub protocol: Protocol,
}

impl FlowKey {
    pub fn new(
        source: IpAddr,
        source_port: u16,
        destination: IpAddr,
        destination_port: u16,
        protocol: Protocol,
    ) -> Self {
        Self {
            source_address: source,
            source_port,
            destination_address: destination,
            destination_port,
            protocol,
        }
    }

    /// The key of the flow travelling in the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            source_address: self.destination_address,
            source_port: self.destination_port,
            destination_address: self.source_address,
            destination_port: self.source_port,
            protocol: self.protocol,
        }
    }
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            SocketDisplay(self.source_address, self.source_port),
            SocketDisplay(self.destination_address, self.destination_port),
            self.protocol
        )
    }
}

struct SocketDisplay(IpAddr, u16);

impl Display for SocketDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            IpAddr::V4(ip) => write!(f, "{ip}:{}", self.1),
            IpAddr::V6(ip) => write!(f, "[{ip}]:{}", self.1),
        }
    }
}

/// Sequence number assigned to a flow the first time its key is seen (starting at 1)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub u32);

impl Display for FlowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
