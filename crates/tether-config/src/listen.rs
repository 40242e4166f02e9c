//! Listen interfaces rendered into the engine's `listen_interfaces` syntax.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-interface listen options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenFlags {
    /// Plain listener.
    #[default]
    None,
    /// Accept SSL torrent connections.
    Ssl,
    /// Treat the interface as local network only.
    LocalNetwork,
}

impl ListenFlags {
    /// Suffix appended to the rendered interface.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Ssl => "s",
            Self::LocalNetwork => "l",
        }
    }
}

/// One endpoint the engine should accept incoming connections on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListenInterface {
    /// An address/port pair.
    Ip {
        /// Address and port to bind.
        endpoint: SocketAddr,
        /// Listen options.
        #[serde(default)]
        flags: ListenFlags,
    },
    /// A network adapter identified by its GUID (Windows).
    Device {
        /// Adapter GUID.
        guid: Uuid,
        /// Listen options.
        #[serde(default)]
        flags: ListenFlags,
    },
}

impl ListenInterface {
    /// Plain listener on `endpoint`.
    #[must_use]
    pub const fn ip(endpoint: SocketAddr) -> Self {
        Self::Ip {
            endpoint,
            flags: ListenFlags::None,
        }
    }

    /// Listener on `endpoint` with `flags`.
    #[must_use]
    pub const fn ip_with(endpoint: SocketAddr, flags: ListenFlags) -> Self {
        Self::Ip { endpoint, flags }
    }

    /// Listener on the adapter `guid` with `flags`.
    #[must_use]
    pub const fn device(guid: Uuid, flags: ListenFlags) -> Self {
        Self::Device { guid, flags }
    }

    /// Listen options.
    #[must_use]
    pub const fn flags(&self) -> ListenFlags {
        match self {
            Self::Ip { flags, .. } | Self::Device { flags, .. } => *flags,
        }
    }
}

impl fmt::Display for ListenInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip { endpoint, flags } => write!(f, "{endpoint}{}", flags.suffix()),
            Self::Device { guid, flags } => {
                let braced = format!("{{{}}}", guid.hyphenated()).to_ascii_uppercase();
                write!(f, "{braced}{}", flags.suffix())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_interfaces_render_with_suffixes() {
        let v6 = ListenInterface::ip("[::]:6001".parse().expect("addr"));
        let v4 = ListenInterface::ip_with("127.0.0.1:10001".parse().expect("addr"), ListenFlags::Ssl);
        let local = ListenInterface::ip_with("10.0.0.2:7000".parse().expect("addr"), ListenFlags::LocalNetwork);

        assert_eq!(v6.to_string(), "[::]:6001");
        assert_eq!(v4.to_string(), "127.0.0.1:10001s");
        assert_eq!(local.to_string(), "10.0.0.2:7000l");
    }

    #[test]
    fn device_interfaces_render_as_braced_upper_case() {
        let guid = Uuid::parse_str("6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b").expect("uuid");
        let iface = ListenInterface::device(guid, ListenFlags::None);

        assert_eq!(iface.to_string(), "{6F1C2A9E-3B4D-4E5F-8A7B-9C0D1E2F3A4B}");
        assert_eq!(iface.flags(), ListenFlags::None);
    }
}
