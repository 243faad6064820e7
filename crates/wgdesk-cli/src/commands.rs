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

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use wgdesk_conf::{
    ConfigStore, GeneratedKeys, InterfaceHandle, InterfaceSummary, KeyStatus, X25519Keys,
};
use wgdesk_types::request::{InterfaceUpdate, NewPeer, PeerUpdate};
use wgdesk_types::{Configuration, InterfaceSection};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List interface configuration files
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show the interface and its peers
    Show {
        #[arg(long)]
        json: bool,
    },

    /// Print the configuration file as it would be written
    Render,

    /// Report key expiry status
    KeyStatus {
        #[arg(long)]
        json: bool,
    },

    /// Generate a new interface key pair and write it out
    GenerateKeys {
        /// Replace an existing private key
        #[arg(long)]
        force: bool,
    },

    /// Update interface settings; omitted options keep their current value
    Configure(ConfigureArgs),

    /// Append a peer
    AddPeer(AddPeerArgs),

    /// Change fields of a peer
    EditPeer {
        index: usize,
        #[command(flatten)]
        fields: PeerFields,
    },

    /// Remove a peer; later peers move up by one
    DeletePeer { index: usize },

    /// Uncomment a peer stanza
    EnablePeer { index: usize },

    /// Comment out a peer stanza
    DisablePeer { index: usize },

    /// Validate and write the configuration
    Save,

    /// Parse a file and print it in canonical form
    Fmt {
        file: PathBuf,
        /// Exit with an error if the file is not already canonical
        #[arg(long)]
        check: bool,
    },
}

#[derive(Debug, Args)]
pub struct ConfigureArgs {
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    dns: Option<String>,
    #[arg(long)]
    listen_port: Option<String>,
    #[arg(long)]
    table: Option<String>,
    #[arg(long)]
    mtu: Option<String>,
    #[arg(long)]
    pre_up: Option<String>,
    #[arg(long)]
    post_up: Option<String>,
    #[arg(long)]
    pre_down: Option<String>,
    #[arg(long)]
    post_down: Option<String>,
    #[arg(long)]
    key_expiry_days: Option<u32>,
}

impl ConfigureArgs {
    /// Merge over the current settings so omitted options stay as they are.
    fn into_update(self, current: InterfaceSection) -> InterfaceUpdate {
        InterfaceUpdate {
            address: self.address.or(Some(current.address)),
            listen_port: self.listen_port.or(Some(current.listen_port)),
            dns: self.dns.or(Some(current.dns)),
            table: self.table.or(Some(current.table)),
            mtu: self.mtu.or(Some(current.mtu)),
            pre_up: self.pre_up.or(Some(current.pre_up)),
            post_up: self.post_up.or(Some(current.post_up)),
            pre_down: self.pre_down.or(Some(current.pre_down)),
            post_down: self.post_down.or(Some(current.post_down)),
            key_expiry_days: self.key_expiry_days,
        }
    }
}

#[derive(Debug, Args)]
pub struct AddPeerArgs {
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    public_key: String,
    #[arg(long)]
    preshared_key: Option<String>,
    /// Generate a random preshared key
    #[arg(long, conflicts_with = "preshared_key")]
    generate_psk: bool,
    #[arg(long, default_value = "")]
    endpoint: String,
    #[arg(long)]
    allowed_ips: Option<String>,
    #[arg(long)]
    persistent_keepalive: Option<String>,
}

impl From<AddPeerArgs> for NewPeer {
    fn from(args: AddPeerArgs) -> Self {
        NewPeer {
            name: args.name,
            public_key: args.public_key,
            preshared_key: args.preshared_key,
            generate_psk: args.generate_psk,
            endpoint: args.endpoint,
            allowed_ips: args.allowed_ips,
            persistent_keepalive: args.persistent_keepalive,
        }
    }
}

#[derive(Debug, Args)]
pub struct PeerFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    public_key: Option<String>,
    /// Pass an empty value to remove the preshared key
    #[arg(long)]
    preshared_key: Option<String>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    allowed_ips: Option<String>,
    #[arg(long)]
    persistent_keepalive: Option<String>,
}

impl From<PeerFields> for PeerUpdate {
    fn from(fields: PeerFields) -> Self {
        PeerUpdate {
            name: fields.name,
            public_key: fields.public_key,
            preshared_key: fields.preshared_key,
            endpoint: fields.endpoint,
            allowed_ips: fields.allowed_ips,
            persistent_keepalive: fields.persistent_keepalive,
        }
    }
}

pub async fn run(store: &ConfigStore, interface: &str, command: Command) -> Result<()> {
    match command {
        Command::List { json } => {
            let list = store.list_interfaces().await?;
            emit(json, &list, |l| format_list(l))?;
        }
        Command::Fmt { file, check } => fmt_file(&file, check).await?,
        command => {
            let handle = store.open(interface).await?;
            run_on_interface(&handle, command).await?;
        }
    }
    Ok(())
}

async fn run_on_interface(handle: &InterfaceHandle, command: Command) -> Result<()> {
    match command {
        Command::Show { json } => {
            let config = handle.snapshot().await;
            emit(json, &config, |c| format_config(handle.name(), c))?;
        }
        Command::Render => print!("{}", handle.render().await),
        Command::KeyStatus { json } => {
            let report = KeyReport::new(handle).await;
            emit(json, &report, format_key_report)?;
        }
        Command::GenerateKeys { force } => {
            let keys = handle.generate_keys(force).await?;
            print!("{}", format_generated(&keys));
        }
        Command::Configure(args) => {
            let current = handle.snapshot().await.interface;
            handle.configure(args.into_update(current)).await;
            handle.save_draft().await?;
            println!("interface {} updated", handle.name());
        }
        Command::AddPeer(args) => {
            let index = handle.add_peer(args.into()).await?;
            handle.save_draft().await?;
            println!("added peer {index}");
        }
        Command::EditPeer { index, fields } => {
            handle.edit_peer(index, fields.into()).await?;
            handle.save_draft().await?;
            println!("updated peer {index}");
        }
        Command::DeletePeer { index } => {
            let removed = handle.delete_peer(index).await?;
            handle.save_draft().await?;
            println!("deleted peer {index} {}", display_name(&removed.name));
        }
        Command::EnablePeer { index } => {
            handle.set_peer_enabled(index, true).await?;
            handle.save_draft().await?;
            println!("enabled peer {index}");
        }
        Command::DisablePeer { index } => {
            handle.set_peer_enabled(index, false).await?;
            handle.save_draft().await?;
            println!("disabled peer {index}");
        }
        Command::Save => {
            handle.save().await?;
            println!("saved {}", handle.path().await.display());
        }
        Command::List { .. } | Command::Fmt { .. } => unreachable!("handled without an interface"),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct KeyReport {
    interface: String,
    #[serde(flatten)]
    status: KeyStatus,
    key_creation_date: Option<String>,
    key_expiry_days: u32,
}

impl KeyReport {
    async fn new(handle: &InterfaceHandle<X25519Keys>) -> Self {
        let iface = handle.snapshot().await.interface;
        Self {
            interface: handle.name().to_string(),
            status: handle.key_status().await,
            key_creation_date: iface.key_creation_date,
            key_expiry_days: iface.key_expiry_days,
        }
    }
}

async fn fmt_file(path: &Path, check: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(path).await?;
    let report = wgdesk_conf::parse_report(&text);
    for diagnostic in &report.diagnostics {
        warn!(path = %path.display(), "{diagnostic}");
        eprintln!("{}: {diagnostic}", path.display());
    }

    let canonical = wgdesk_conf::serialize(&report.config);
    if check {
        if canonical != text {
            return Err(format!("{} is not in canonical form", path.display()).into());
        }
        info!(path = %path.display(), "file is canonical");
    } else {
        print!("{canonical}");
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", human(value));
    }
    Ok(())
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "(unnamed)" } else { name }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() { "NOT SET" } else { value }
}

fn format_list(list: &[InterfaceSummary]) -> String {
    let mut out = String::new();
    if list.is_empty() {
        writeln!(out, "no interfaces found").unwrap();
    }
    for summary in list {
        writeln!(
            out,
            "{:<16} {:<20} {}",
            summary.name,
            or_unset(&summary.address),
            or_unset(&summary.public_key)
        )
        .unwrap();
    }
    out
}

fn format_config(name: &str, config: &Configuration) -> String {
    let iface = &config.interface;
    let mut out = String::new();
    writeln!(out, "interface {name}").unwrap();
    writeln!(out, "  public key: {}", or_unset(&iface.public_key)).unwrap();
    writeln!(out, "  address:    {}", or_unset(&iface.address)).unwrap();
    if !iface.listen_port.is_empty() {
        writeln!(out, "  port:       {}", iface.listen_port).unwrap();
    }
    writeln!(
        out,
        "  peers:      {} ({} enabled)",
        config.peers.len(),
        config.enabled_peers()
    )
    .unwrap();

    for (i, peer) in config.peers.iter().enumerate() {
        let state = if peer.enabled { "enabled" } else { "disabled" };
        writeln!(out).unwrap();
        writeln!(out, "[{i}] {} ({state})", display_name(&peer.name)).unwrap();
        writeln!(out, "    public key:  {}", or_unset(&peer.public_key)).unwrap();
        writeln!(out, "    endpoint:    {}", or_unset(&peer.endpoint)).unwrap();
        writeln!(out, "    allowed ips: {}", or_unset(&peer.allowed_ips)).unwrap();
        if !peer.preshared_key.is_empty() {
            writeln!(out, "    preshared:   ***{}", tail(&peer.preshared_key, 8)).unwrap();
        }
        if !peer.persistent_keepalive.is_empty() {
            writeln!(out, "    keepalive:   {}", peer.persistent_keepalive).unwrap();
        }
    }
    out
}

fn format_generated(keys: &GeneratedKeys) -> String {
    let mut out = String::new();
    writeln!(out, "public key: {}", keys.new_public_key).unwrap();
    if keys.old_public_key.is_empty() {
        return out;
    }
    writeln!(out, "replaced:   {}", keys.old_public_key).unwrap();
    if !keys.peers_to_notify.is_empty() {
        writeln!(out, "update the interface public key on these peers:").unwrap();
    }
    for peer in &keys.peers_to_notify {
        writeln!(
            out,
            "  [{}] {} {} {}",
            peer.index,
            display_name(&peer.name),
            or_unset(&peer.public_key),
            or_unset(&peer.endpoint)
        )
        .unwrap();
    }
    out
}

fn format_key_report(report: &KeyReport) -> String {
    let line = match report.status {
        KeyStatus::Unset => "no key creation date recorded".to_string(),
        KeyStatus::Valid { remaining_days } => format!("valid, {remaining_days} days remaining"),
        KeyStatus::ExpiringSoon { remaining_days } => {
            format!("expiring soon, {remaining_days} days remaining")
        }
        KeyStatus::Expired { remaining_days } => {
            format!("expired {} days ago, generate new keys", -remaining_days)
        }
    };
    format!("{}: {line}\n", report.interface)
}

fn tail(s: &str, n: usize) -> &str {
    let start = s.char_indices().rev().nth(n.saturating_sub(1)).map_or(0, |(i, _)| i);
    &s[start..]
}
