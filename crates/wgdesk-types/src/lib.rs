// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! wgdesk-types: the configuration model shared by the wgdesk crates.
//!
//! A [`Configuration`] mirrors one `wg-quick` style file: a single
//! `[Interface]` stanza and an ordered list of `[Peer]` stanzas. Values are
//! kept as the strings found in the file; nothing here validates addresses or
//! key material.

#![warn(missing_docs)]

pub mod request;

use serde::{Deserialize, Serialize};

/// Expiry window applied when a file carries no `Key Expiry Days` metadata.
pub const DEFAULT_KEY_EXPIRY_DAYS: u32 = 90;

/// MTU written into configurations created from scratch.
pub const DEFAULT_MTU: &str = "1420";

/// A parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// The `[Interface]` stanza.
    pub interface: InterfaceSection,
    /// Peers in file order. Position is the only peer identity.
    pub peers: Vec<Peer>,
}

impl Configuration {
    /// Configuration used when no file exists yet for an interface.
    pub fn fresh() -> Self {
        Self {
            interface: InterfaceSection {
                mtu: DEFAULT_MTU.to_string(),
                ..InterfaceSection::default()
            },
            peers: Vec::new(),
        }
    }

    /// Number of peers whose stanza is live.
    pub fn enabled_peers(&self) -> usize {
        self.peers.iter().filter(|p| p.enabled).count()
    }
}

/// The `[Interface]` stanza plus the key metadata stored beside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSection {
    /// Base64 private key. Empty means unset.
    pub private_key: String,
    /// Derived from `private_key`; never written to the file.
    pub public_key: String,
    /// Interface address(es), verbatim.
    pub address: String,
    /// DNS servers, verbatim.
    pub dns: String,
    /// UDP listen port, verbatim.
    pub listen_port: String,
    /// Routing table, verbatim.
    pub table: String,
    /// MTU, verbatim.
    pub mtu: String,
    /// `PreUp` hook.
    pub pre_up: String,
    /// `PostUp` hook.
    pub post_up: String,
    /// `PreDown` hook.
    pub pre_down: String,
    /// `PostDown` hook.
    pub post_down: String,
    /// When the key pair was generated, as written in the file.
    pub key_creation_date: Option<String>,
    /// Number of days the key pair stays valid.
    pub key_expiry_days: u32,
}

impl Default for InterfaceSection {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            public_key: String::new(),
            address: String::new(),
            dns: String::new(),
            listen_port: String::new(),
            table: String::new(),
            mtu: String::new(),
            pre_up: String::new(),
            post_up: String::new(),
            pre_down: String::new(),
            post_down: String::new(),
            key_creation_date: None,
            key_expiry_days: DEFAULT_KEY_EXPIRY_DAYS,
        }
    }
}

impl InterfaceSection {
    /// Whether the fields required to bring the interface up are present.
    pub fn is_configured(&self) -> bool {
        !self.private_key.is_empty() && !self.address.is_empty()
    }
}

/// A `[Peer]` stanza.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Display label, stored as a `# Name =` comment above the stanza.
    pub name: String,
    /// Peer public key.
    pub public_key: String,
    /// Optional preshared key. Empty means none.
    pub preshared_key: String,
    /// `host:port` of the peer, verbatim.
    pub endpoint: String,
    /// Allowed IP ranges, verbatim.
    pub allowed_ips: String,
    /// Keepalive interval in seconds, verbatim.
    pub persistent_keepalive: String,
    /// `false` when the whole stanza is commented out.
    pub enabled: bool,
}

impl Peer {
    /// A peer with every field empty.
    pub fn empty(enabled: bool) -> Self {
        Self {
            name: String::new(),
            public_key: String::new(),
            preshared_key: String::new(),
            endpoint: String::new(),
            allowed_ips: String::new(),
            persistent_keepalive: String::new(),
            enabled,
        }
    }
}
