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

//! Writes a [`Configuration`] back out in `wg-quick` form.

use std::fmt::Write as _;

use wgdesk_types::{Configuration, InterfaceSection, Peer};

/// Render the configuration file text.
///
/// Output depends only on field values. No validation happens here; an
/// incomplete configuration is written as is.
pub fn serialize(config: &Configuration) -> String {
    let mut out = String::new();
    write_interface(&mut out, &config.interface);
    for peer in &config.peers {
        writeln!(out).unwrap();
        write_peer(&mut out, peer);
    }
    out
}

fn write_interface(out: &mut String, iface: &InterfaceSection) {
    writeln!(out, "[Interface]").unwrap();
    if let Some(ref created) = iface.key_creation_date {
        writeln!(out, "# Key Creation = {created}").unwrap();
    }
    if iface.key_expiry_days > 0 {
        writeln!(out, "# Key Expiry Days = {}", iface.key_expiry_days).unwrap();
    }

    writeln!(out, "PrivateKey = {}", iface.private_key).unwrap();
    writeln!(out, "Address = {}", iface.address).unwrap();

    let optional = [
        ("DNS", &iface.dns),
        ("ListenPort", &iface.listen_port),
        ("MTU", &iface.mtu),
        ("Table", &iface.table),
        ("PreUp", &iface.pre_up),
        ("PostUp", &iface.post_up),
        ("PreDown", &iface.pre_down),
        ("PostDown", &iface.post_down),
    ];
    for (key, value) in optional {
        if !value.is_empty() {
            writeln!(out, "{key} = {value}").unwrap();
        }
    }
}

fn write_peer(out: &mut String, peer: &Peer) {
    // Metadata is always a comment, whatever the peer state.
    if !peer.name.is_empty() {
        writeln!(out, "# Name = {}", peer.name).unwrap();
    }

    let prefix = if peer.enabled { "" } else { "# " };
    writeln!(out, "{prefix}[Peer]").unwrap();
    writeln!(out, "{prefix}PublicKey = {}", peer.public_key).unwrap();
    if !peer.preshared_key.is_empty() {
        writeln!(out, "{prefix}PresharedKey = {}", peer.preshared_key).unwrap();
    }
    writeln!(out, "{prefix}Endpoint = {}", peer.endpoint).unwrap();
    writeln!(out, "{prefix}AllowedIPs = {}", peer.allowed_ips).unwrap();
    if !peer.persistent_keepalive.is_empty() {
        writeln!(out, "{prefix}PersistentKeepalive = {}", peer.persistent_keepalive).unwrap();
    }
}
