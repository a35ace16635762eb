use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Hostname(String),
}

impl Address {
    pub fn from(s: &str) -> std::io::Result<Self> {
        if s.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Empty address",
            ));
        }

        // Brackets are allowed around ipv6 literals, as in `[::1]:22`.
        let unbracketed = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'));
        if let Some(inner) = unbracketed {
            return inner.parse::<Ipv6Addr>().map(Address::Ipv6).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Failed to parse ipv6 address {s}: {e}"),
                )
            });
        }

        if let Ok(addr) = s.parse::<IpAddr>() {
            return Ok(match addr {
                IpAddr::V4(v4) => Address::Ipv4(v4),
                IpAddr::V6(v6) => Address::Ipv6(v6),
            });
        }

        let valid_hostname = s
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b'_');
        if valid_hostname {
            return Ok(Address::Hostname(s.to_string()));
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse address: {s}"),
        ))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Address::Ipv4(i) => write!(f, "{i}"),
            Address::Ipv6(i) => write!(f, "[{i}]"),
            Address::Hostname(h) => write!(f, "{h}"),
        }
    }
}

/// A host and port, where the host may still need to be resolved.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct NetLocation {
    address: Address,
    port: u16,
}

impl NetLocation {
    pub const fn new(address: Address, port: u16) -> Self {
        Self { address, port }
    }

    pub fn from_str(s: &str) -> std::io::Result<Self> {
        let (address_str, port_str) = s.rsplit_once(':').ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("No port in location: {s}"),
            )
        })?;

        let port = port_str.parse::<u16>().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid port in location {s}: {e}"),
            )
        })?;

        // An unbracketed ipv6 literal is ambiguous with its port.
        if address_str.contains(':') && !address_str.starts_with('[') {
            return Err(std::io::Error::other(format!(
                "ipv6 location must be bracketed: {s}"
            )));
        }

        let address = Address::from(address_str)?;

        Ok(Self { address, port })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_addr_nonblocking(&self) -> Option<SocketAddr> {
        match self.address {
            Address::Ipv6(ref addr) => Some(SocketAddr::new(IpAddr::V6(*addr), self.port)),
            Address::Ipv4(ref addr) => Some(SocketAddr::new(IpAddr::V4(*addr), self.port)),
            Address::Hostname(_) => None,
        }
    }

    /// Resolves the location to socket addresses, skipping DNS for ip literals.
    pub async fn resolve(&self) -> std::io::Result<Vec<SocketAddr>> {
        if let Some(addr) = self.to_socket_addr_nonblocking() {
            return Ok(vec![addr]);
        }

        let addrs = tokio::net::lookup_host((self.address.to_string(), self.port))
            .await?
            .filter(|addr| !addr.ip().is_unspecified())
            .collect::<Vec<_>>();

        if addrs.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("could not resolve location: {self}"),
            ));
        }

        Ok(addrs)
    }
}

impl std::fmt::Display for NetLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl<'de> serde::de::Deserialize<'de> for NetLocation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        NetLocation::from_str(&value).map_err(|_| {
            serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(&value),
                &"a host:port location",
            )
        })
    }
}
