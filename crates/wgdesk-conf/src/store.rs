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

//! Configuration store keyed by interface name.
//!
//! Each interface file has one in-memory [`Configuration`] behind its own
//! mutex. All reads and writes of that file go through the lock, so two
//! operations on the same interface never interleave and different
//! interfaces never contend. Writes also refuse to clobber a file that was
//! changed on disk since it was last loaded or saved.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wgdesk_types::request::{
    DEFAULT_ALLOWED_IPS, DEFAULT_LISTEN_PORT, DEFAULT_PERSISTENT_KEEPALIVE, InterfaceUpdate,
    NewPeer, PeerUpdate,
};
use wgdesk_types::{Configuration, DEFAULT_MTU, Peer};

use crate::keys::{self, KeyDeriver, KeyGenerator, X25519Keys};
use crate::lifecycle::{self, KeyStatus};
use crate::parse::{self, ParseReport};
use crate::render;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Key(#[from] keys::KeyError),

    #[error("invalid interface name: {0:?}")]
    InvalidInterfaceName(String),

    #[error("key has expired, generate new keys first")]
    KeyExpired,

    #[error("a private key is already configured")]
    KeyExists,

    #[error("interface not configured, set a private key and address first")]
    InterfaceNotConfigured,

    #[error("missing required fields (private key, address)")]
    MissingRequiredFields,

    #[error("no peers configured")]
    NoPeers,

    #[error("peer {0} not found")]
    PeerNotFound(usize),

    #[error("{} was modified on disk, reload before writing", .0.display())]
    ModifiedOnDisk(PathBuf),
}

impl StoreError {
    /// Errors caused by the request rather than by the environment.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Key(_) | Self::ModifiedOnDisk(_))
    }
}

type Result<T> = std::result::Result<T, StoreError>;

/// Interface names accepted by `wg-quick`.
pub fn validate_interface_name(name: &str) -> Result<()> {
    let valid = (1..=15).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '+' | '.' | '-'))
        && name != "."
        && name != "..";
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidInterfaceName(name.to_string()))
    }
}

pub fn config_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.conf"))
}

/// Read and parse a configuration file. A missing file yields `None`.
pub async fn load(path: &Path) -> Result<Option<ParseReport>> {
    Ok(read_text(path).await?.map(|text| {
        let report = parse::parse_report(&text);
        log_report(path, &report);
        report
    }))
}

/// Serialize `config` and write it to `path`, returning the text written.
pub async fn save(path: &Path, config: &Configuration) -> Result<String> {
    let contents = render::serialize(config);
    write_private(path, &contents).await?;
    info!(
        path = %path.display(),
        peer_count = config.peers.len(),
        "saved config"
    );
    Ok(contents)
}

async fn read_text(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(e)),
    }
}

fn log_report(path: &Path, report: &ParseReport) {
    debug!(
        path = %path.display(),
        peer_count = report.config.peers.len(),
        "loaded config"
    );
    for diagnostic in &report.diagnostics {
        warn!(path = %path.display(), "{diagnostic}");
    }
}

/// Write through a temporary file so readers never see a partial config.
async fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);

    let mut file = opts.open(&tmp).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Summary row for an interface file in the store directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSummary {
    pub name: String,
    pub public_key: String,
    pub address: String,
}

/// Key pair produced by [`InterfaceHandle::generate_keys`].
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedKeys {
    pub old_public_key: String,
    pub new_public_key: String,
    pub created_at: String,
    /// Enabled peers that still hold the old public key. Empty when no key
    /// was replaced.
    pub peers_to_notify: Vec<PeerNotice>,
}

/// A peer whose side of the tunnel must learn the new public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerNotice {
    pub index: usize,
    pub name: String,
    pub public_key: String,
    pub endpoint: String,
}

#[derive(Debug)]
struct InterfaceState {
    path: PathBuf,
    config: Configuration,
    /// File contents as last read or written; `None` if the file did not exist.
    on_disk: Option<String>,
}

pub type Clock = fn() -> DateTime<Utc>;

#[derive(Debug)]
pub struct ConfigStore<K = X25519Keys> {
    dir: PathBuf,
    keys: Arc<K>,
    clock: Clock,
    entries: DashMap<String, Arc<Mutex<InterfaceState>>>,
}

impl ConfigStore<X25519Keys> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_keys(dir, X25519Keys)
    }
}

impl<K> ConfigStore<K>
where
    K: KeyDeriver + KeyGenerator + Send + Sync,
{
    pub fn with_keys(dir: impl Into<PathBuf>, keys: K) -> Self {
        Self {
            dir: dir.into(),
            keys: Arc::new(keys),
            clock: Utc::now,
            entries: DashMap::new(),
        }
    }

    /// Replace the time source used for key expiry decisions.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Handle to an interface, loading its file on first use.
    #[tracing::instrument(skip(self))]
    pub async fn open(&self, name: &str) -> Result<InterfaceHandle<K>> {
        validate_interface_name(name)?;

        if let Some(entry) = self.entries.get(name) {
            return Ok(self.handle(name, entry.value().clone()));
        }

        let state = self.read_state(name).await?;
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(state)))
            .value()
            .clone();
        Ok(self.handle(name, entry))
    }

    /// Discard in-memory changes and re-read the file.
    #[tracing::instrument(skip(self))]
    pub async fn reload(&self, name: &str) -> Result<InterfaceHandle<K>> {
        let handle = self.open(name).await?;
        {
            let mut state = handle.state.lock().await;
            *state = self.read_state(name).await?;
        }
        Ok(handle)
    }

    /// Drop the cached state of an interface. Returns whether it was cached.
    pub fn evict(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Every `*.conf` file in the store directory, sorted by name.
    #[tracing::instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn list_interfaces(&self) -> Result<Vec<InterfaceSummary>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("conf") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_interface_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            let path = config_path(&self.dir, &name);
            let Some(text) = read_text(&path).await? else {
                continue;
            };
            let mut config = parse::parse(&text);
            keys::populate_public_key(&mut config, self.keys.as_ref());
            summaries.push(InterfaceSummary {
                name,
                public_key: config.interface.public_key,
                address: config.interface.address,
            });
        }
        debug!(count = summaries.len(), "listed interfaces");
        Ok(summaries)
    }

    async fn read_state(&self, name: &str) -> Result<InterfaceState> {
        let path = config_path(&self.dir, name);
        let on_disk = read_text(&path).await?;
        let config = match on_disk {
            Some(ref text) => {
                let report = parse::parse_report(text);
                log_report(&path, &report);
                let mut config = report.config;
                keys::populate_public_key(&mut config, self.keys.as_ref());
                config
            }
            None => {
                info!(path = %path.display(), "config file not found, starting with empty config");
                Configuration::fresh()
            }
        };
        Ok(InterfaceState {
            path,
            config,
            on_disk,
        })
    }

    fn handle(&self, name: &str, state: Arc<Mutex<InterfaceState>>) -> InterfaceHandle<K> {
        InterfaceHandle {
            name: name.to_string(),
            keys: self.keys.clone(),
            clock: self.clock,
            state,
        }
    }
}

/// Shared handle to one interface's configuration.
#[derive(Debug)]
pub struct InterfaceHandle<K = X25519Keys> {
    name: String,
    keys: Arc<K>,
    clock: Clock,
    state: Arc<Mutex<InterfaceState>>,
}

impl<K> Clone for InterfaceHandle<K> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            keys: self.keys.clone(),
            clock: self.clock,
            state: self.state.clone(),
        }
    }
}

impl<K> InterfaceHandle<K>
where
    K: KeyDeriver + KeyGenerator + Send + Sync,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn path(&self) -> PathBuf {
        self.state.lock().await.path.clone()
    }

    /// Whether the configuration was read from an existing file.
    pub async fn exists_on_disk(&self) -> bool {
        self.state.lock().await.on_disk.is_some()
    }

    pub async fn snapshot(&self) -> Configuration {
        self.state.lock().await.config.clone()
    }

    pub async fn render(&self) -> String {
        render::serialize(&self.state.lock().await.config)
    }

    pub async fn key_status(&self) -> KeyStatus {
        let now = (self.clock)();
        lifecycle::key_status(&self.state.lock().await.config.interface, now)
    }

    /// Generate a new key pair and write it out immediately.
    ///
    /// Refuses to replace an existing key unless `force` is set. Allowed
    /// even when the current key has expired.
    #[tracing::instrument(skip(self), fields(interface = %self.name))]
    pub async fn generate_keys(&self, force: bool) -> Result<GeneratedKeys> {
        let mut state = self.state.lock().await;
        if !state.config.interface.private_key.is_empty() && !force {
            return Err(StoreError::KeyExists);
        }

        let private_key = self.keys.generate_private_key();
        let public_key = self.keys.derive_public_key(&private_key)?;
        let created_at = lifecycle::format_creation_date((self.clock)());

        let mut config = state.config.clone();
        let iface = &mut config.interface;
        let old_public_key = std::mem::replace(&mut iface.public_key, public_key.clone());
        iface.private_key = private_key;
        iface.key_creation_date = Some(created_at.clone());

        let contents = write_config(&state, &config).await?;
        state.config = config;
        state.on_disk = Some(contents);
        info!(public_key = %public_key, "generated new interface key pair");

        let peers_to_notify = if old_public_key.is_empty() {
            Vec::new()
        } else {
            state
                .config
                .peers
                .iter()
                .enumerate()
                .filter(|(_, peer)| peer.enabled)
                .map(|(index, peer)| PeerNotice {
                    index,
                    name: peer.name.clone(),
                    public_key: peer.public_key.clone(),
                    endpoint: peer.endpoint.clone(),
                })
                .collect()
        };

        Ok(GeneratedKeys {
            old_public_key,
            new_public_key: public_key,
            created_at,
            peers_to_notify,
        })
    }

    /// Replace the interface settings.
    #[tracing::instrument(skip(self, update), fields(interface = %self.name))]
    pub async fn configure(&self, update: InterfaceUpdate) -> Configuration {
        let mut state = self.state.lock().await;
        let iface = &mut state.config.interface;
        iface.address = update.address.unwrap_or_default();
        iface.listen_port = non_empty_or(update.listen_port, DEFAULT_LISTEN_PORT);
        iface.dns = update.dns.unwrap_or_default();
        iface.table = update.table.unwrap_or_default();
        iface.mtu = non_empty_or(update.mtu, DEFAULT_MTU);
        iface.pre_up = update.pre_up.unwrap_or_default();
        iface.post_up = update.post_up.unwrap_or_default();
        iface.pre_down = update.pre_down.unwrap_or_default();
        iface.post_down = update.post_down.unwrap_or_default();
        if let Some(days) = update.key_expiry_days.filter(|d| *d > 0) {
            iface.key_expiry_days = days;
        }
        debug!(address = %iface.address, "interface configured");
        state.config.clone()
    }

    /// Append a peer and return its index.
    #[tracing::instrument(skip(self, new), fields(interface = %self.name))]
    pub async fn add_peer(&self, new: NewPeer) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_key_valid(&state.config)?;
        if !state.config.interface.is_configured() {
            return Err(StoreError::InterfaceNotConfigured);
        }

        let preshared_key = if new.generate_psk {
            self.keys.generate_preshared_key()
        } else {
            new.preshared_key.unwrap_or_default()
        };
        state.config.peers.push(Peer {
            name: new.name,
            public_key: new.public_key,
            preshared_key,
            endpoint: new.endpoint,
            allowed_ips: non_empty_or(new.allowed_ips, DEFAULT_ALLOWED_IPS),
            persistent_keepalive: non_empty_or(
                new.persistent_keepalive,
                DEFAULT_PERSISTENT_KEEPALIVE,
            ),
            enabled: true,
        });

        let index = state.config.peers.len() - 1;
        info!(index, "peer added");
        Ok(index)
    }

    #[tracing::instrument(skip(self, update), fields(interface = %self.name))]
    pub async fn edit_peer(&self, index: usize, update: PeerUpdate) -> Result<Peer> {
        let mut state = self.state.lock().await;
        self.ensure_key_valid(&state.config)?;
        let peer = state
            .config
            .peers
            .get_mut(index)
            .ok_or(StoreError::PeerNotFound(index))?;

        let PeerUpdate {
            name,
            public_key,
            preshared_key,
            endpoint,
            allowed_ips,
            persistent_keepalive,
        } = update;
        let fields = [
            (name, &mut peer.name),
            (public_key, &mut peer.public_key),
            (preshared_key, &mut peer.preshared_key),
            (endpoint, &mut peer.endpoint),
            (allowed_ips, &mut peer.allowed_ips),
            (persistent_keepalive, &mut peer.persistent_keepalive),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }

        info!(index, "peer updated");
        Ok(peer.clone())
    }

    /// Remove a peer. Later peers shift down by one.
    #[tracing::instrument(skip(self), fields(interface = %self.name))]
    pub async fn delete_peer(&self, index: usize) -> Result<Peer> {
        let mut state = self.state.lock().await;
        self.ensure_key_valid(&state.config)?;
        if index >= state.config.peers.len() {
            return Err(StoreError::PeerNotFound(index));
        }
        let removed = state.config.peers.remove(index);
        info!(index, "peer deleted");
        Ok(removed)
    }

    #[tracing::instrument(skip(self), fields(interface = %self.name))]
    pub async fn set_peer_enabled(&self, index: usize, enabled: bool) -> Result<Peer> {
        let mut state = self.state.lock().await;
        self.ensure_key_valid(&state.config)?;
        let peer = state
            .config
            .peers
            .get_mut(index)
            .ok_or(StoreError::PeerNotFound(index))?;
        peer.enabled = enabled;
        info!(index, enabled, "peer state changed");
        Ok(peer.clone())
    }

    /// Validate and write the configuration, returning the text written.
    #[tracing::instrument(skip(self), fields(interface = %self.name))]
    pub async fn save(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.ensure_key_valid(&state.config)?;
        if !state.config.interface.is_configured() {
            return Err(StoreError::MissingRequiredFields);
        }
        if state.config.peers.is_empty() {
            return Err(StoreError::NoPeers);
        }
        write_state(&mut state).await
    }

    /// Write the configuration without the completeness checks of
    /// [`save`](Self::save). An expired key still blocks the write.
    #[tracing::instrument(skip(self), fields(interface = %self.name))]
    pub async fn save_draft(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.ensure_key_valid(&state.config)?;
        write_state(&mut state).await
    }

    fn ensure_key_valid(&self, config: &Configuration) -> Result<()> {
        if lifecycle::is_expired(&config.interface, (self.clock)()) {
            warn!(interface = %self.name, "rejected operation, key expired");
            return Err(StoreError::KeyExpired);
        }
        Ok(())
    }
}

async fn write_state(state: &mut InterfaceState) -> Result<String> {
    let contents = write_config(state, &state.config).await?;
    state.on_disk = Some(contents.clone());
    Ok(contents)
}

/// Write `config` to the state's file unless it changed on disk.
async fn write_config(state: &InterfaceState, config: &Configuration) -> Result<String> {
    let current = read_text(&state.path).await?;
    if current != state.on_disk {
        warn!(path = %state.path.display(), "config changed on disk since it was loaded");
        return Err(StoreError::ModifiedOnDisk(state.path.clone()));
    }
    save(&state.path, config).await
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
