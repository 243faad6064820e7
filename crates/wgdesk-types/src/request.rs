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

//! Mutation requests applied to a [`Configuration`](crate::Configuration).

use serde::{Deserialize, Serialize};

/// Allowed IPs given to a new peer when none are supplied.
pub const DEFAULT_ALLOWED_IPS: &str = "0.0.0.0/0";

/// Keepalive given to a new peer when none is supplied.
pub const DEFAULT_PERSISTENT_KEEPALIVE: &str = "25";

/// Listen port applied by an interface update that leaves it out.
pub const DEFAULT_LISTEN_PORT: &str = "51820";

/// A peer to append to the configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPeer {
    /// Display label.
    #[serde(default)]
    pub name: String,
    /// Peer public key.
    #[serde(default)]
    pub public_key: String,
    /// Explicit preshared key.
    #[serde(default)]
    pub preshared_key: Option<String>,
    /// Generate a fresh preshared key instead of using `preshared_key`.
    #[serde(default)]
    pub generate_psk: bool,
    /// `host:port` of the peer.
    #[serde(default)]
    pub endpoint: String,
    /// Allowed IPs; defaults to [`DEFAULT_ALLOWED_IPS`].
    #[serde(default)]
    pub allowed_ips: Option<String>,
    /// Keepalive; defaults to [`DEFAULT_PERSISTENT_KEEPALIVE`].
    #[serde(default)]
    pub persistent_keepalive: Option<String>,
}

/// Partial update of an existing peer. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerUpdate {
    /// New display label.
    #[serde(default)]
    pub name: Option<String>,
    /// New public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// New preshared key; `Some("")` removes it.
    #[serde(default)]
    pub preshared_key: Option<String>,
    /// New endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// New allowed IPs.
    #[serde(default)]
    pub allowed_ips: Option<String>,
    /// New keepalive.
    #[serde(default)]
    pub persistent_keepalive: Option<String>,
}

/// Replacement of the `[Interface]` settings.
///
/// Fields left as `None` are cleared, except `listen_port` and `mtu` which
/// fall back to their defaults and `key_expiry_days` which keeps its value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceUpdate {
    /// Interface address(es).
    #[serde(default)]
    pub address: Option<String>,
    /// Listen port.
    #[serde(default)]
    pub listen_port: Option<String>,
    /// DNS servers.
    #[serde(default)]
    pub dns: Option<String>,
    /// Routing table.
    #[serde(default)]
    pub table: Option<String>,
    /// MTU.
    #[serde(default)]
    pub mtu: Option<String>,
    /// `PreUp` hook.
    #[serde(default)]
    pub pre_up: Option<String>,
    /// `PostUp` hook.
    #[serde(default)]
    pub post_up: Option<String>,
    /// `PreDown` hook.
    #[serde(default)]
    pub pre_down: Option<String>,
    /// `PostDown` hook.
    #[serde(default)]
    pub post_down: Option<String>,
    /// New expiry window in days; zero is ignored.
    #[serde(default)]
    pub key_expiry_days: Option<u32>,
}
