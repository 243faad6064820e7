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

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use wgdesk_conf::keys::{KeyDeriver, KeyError, KeyGenerator};
use wgdesk_conf::store::{self, ConfigStore, StoreError};
use wgdesk_conf::{KeyStatus, X25519Keys, parse};
use wgdesk_types::request::{InterfaceUpdate, NewPeer, PeerUpdate};

// -- Deterministic key capability --

#[derive(Debug, Clone, Copy)]
struct FakeKeys;

impl KeyDeriver for FakeKeys {
    fn derive_public_key(&self, private_key: &str) -> Result<String, KeyError> {
        if private_key == "broken" {
            return Err(KeyError::InvalidLength(0));
        }
        Ok(format!("pub({private_key})"))
    }
}

impl KeyGenerator for FakeKeys {
    fn generate_private_key(&self) -> String {
        "fresh-private".into()
    }

    fn generate_preshared_key(&self) -> String {
        "fresh-psk".into()
    }
}

fn june_first() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn store_in(dir: &Path) -> ConfigStore<FakeKeys> {
    ConfigStore::with_keys(dir, FakeKeys).with_clock(june_first)
}

const CONFIGURED: &str = "\
[Interface]
# Key Creation = 2024-05-01T00:00:00.000Z
# Key Expiry Days = 90
PrivateKey = server-private
Address = 10.0.0.1/24
ListenPort = 51820

# Name = laptop
[Peer]
PublicKey = laptop-pub
Endpoint = 
AllowedIPs = 10.0.0.2/32
";

const EXPIRED: &str = "\
[Interface]
# Key Creation = 2024-01-01T00:00:00.000Z
# Key Expiry Days = 30
PrivateKey = server-private
Address = 10.0.0.1/24

[Peer]
PublicKey = laptop-pub
Endpoint = 
AllowedIPs = 10.0.0.2/32
";

async fn write(dir: &Path, name: &str, text: &str) {
    tokio::fs::write(store::config_path(dir, name), text).await.unwrap();
}

async fn read(dir: &Path, name: &str) -> String {
    tokio::fs::read_to_string(store::config_path(dir, name)).await.unwrap()
}

// -- Tests --

#[tokio::test]
async fn missing_file_yields_fresh_configuration() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store_in(tmp.path());

    let handle = store.open("wg0").await.unwrap();
    let config = handle.snapshot().await;

    assert!(!handle.exists_on_disk().await);
    assert_eq!(config.interface.mtu, "1420");
    assert_eq!(config.interface.key_expiry_days, 90);
    assert!(config.peers.is_empty());
    assert_eq!(handle.key_status().await, KeyStatus::Unset);
}

#[tokio::test]
async fn open_derives_public_key() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());

    let config = store.open("wg0").await.unwrap().snapshot().await;
    assert_eq!(config.interface.public_key, "pub(server-private)");
    assert_eq!(config.peers[0].name, "laptop");
}

#[tokio::test]
async fn open_rejects_path_traversal() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store_in(tmp.path());
    let err = store.open("../passwd").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidInterfaceName(_)));
}

#[tokio::test]
async fn handles_share_state_per_interface() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());

    let a = store.open("wg0").await.unwrap();
    let b = store.open("wg0").await.unwrap();
    let other = store.open("wg1").await.unwrap();

    a.set_peer_enabled(0, false).await.unwrap();
    assert!(!b.snapshot().await.peers[0].enabled);
    assert!(other.snapshot().await.peers.is_empty());
}

#[tokio::test]
async fn add_edit_disable_and_save() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    let index = handle
        .add_peer(NewPeer {
            name: "office".into(),
            public_key: "office-pub".into(),
            generate_psk: true,
            ..NewPeer::default()
        })
        .await
        .unwrap();
    assert_eq!(index, 1);

    let edited = handle
        .edit_peer(
            index,
            PeerUpdate {
                endpoint: Some("office.example.com:51820".into()),
                ..PeerUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.name, "office");
    assert_eq!(edited.allowed_ips, "0.0.0.0/0");
    assert_eq!(edited.persistent_keepalive, "25");
    assert_eq!(edited.preshared_key, "fresh-psk");

    handle.set_peer_enabled(0, false).await.unwrap();
    let written = handle.save().await.unwrap();
    assert_eq!(read(tmp.path(), "wg0").await, written);

    let reparsed = parse(&written);
    assert_eq!(reparsed.peers.len(), 2);
    assert!(!reparsed.peers[0].enabled);
    assert_eq!(reparsed.peers[0].name, "laptop");
    assert_eq!(reparsed.peers[1].name, "office");
    assert_eq!(reparsed.peers[1].endpoint, "office.example.com:51820");
    assert!(written.contains("# Name = laptop\n# [Peer]\n# PublicKey = laptop-pub\n"));
}

#[tokio::test]
async fn delete_shifts_indices() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    handle
        .add_peer(NewPeer {
            name: "second".into(),
            ..NewPeer::default()
        })
        .await
        .unwrap();
    let removed = handle.delete_peer(0).await.unwrap();
    assert_eq!(removed.name, "laptop");
    assert_eq!(handle.snapshot().await.peers[0].name, "second");

    let err = handle.delete_peer(1).await.unwrap_err();
    assert!(matches!(err, StoreError::PeerNotFound(1)));
}

#[tokio::test]
async fn add_peer_requires_configured_interface() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    let err = handle.add_peer(NewPeer::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::InterfaceNotConfigured));
}

#[tokio::test]
async fn save_enforces_required_fields_and_peers() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    assert!(matches!(
        handle.save().await.unwrap_err(),
        StoreError::MissingRequiredFields
    ));

    handle.generate_keys(false).await.unwrap();
    handle
        .configure(InterfaceUpdate {
            address: Some("10.0.0.1/24".into()),
            ..InterfaceUpdate::default()
        })
        .await;
    assert!(matches!(handle.save().await.unwrap_err(), StoreError::NoPeers));

    // A draft write skips the completeness rules.
    let draft = handle.save_draft().await.unwrap();
    assert!(draft.contains("Address = 10.0.0.1/24\n"));
    assert!(draft.contains("ListenPort = 51820\n"));
    assert!(draft.contains("MTU = 1420\n"));
}

#[tokio::test]
async fn expired_key_blocks_mutation_but_not_regeneration() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", EXPIRED).await;
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    let status = handle.key_status().await;
    assert!(status.is_expired());
    assert!(status.remaining_days().unwrap() < 0);

    assert!(matches!(handle.save().await, Err(StoreError::KeyExpired)));
    assert!(matches!(handle.save_draft().await, Err(StoreError::KeyExpired)));
    assert!(matches!(
        handle.add_peer(NewPeer::default()).await,
        Err(StoreError::KeyExpired)
    ));
    assert!(matches!(
        handle.edit_peer(0, PeerUpdate::default()).await,
        Err(StoreError::KeyExpired)
    ));
    assert!(matches!(handle.delete_peer(0).await, Err(StoreError::KeyExpired)));
    assert!(matches!(
        handle.set_peer_enabled(0, false).await,
        Err(StoreError::KeyExpired)
    ));

    assert!(matches!(
        handle.generate_keys(false).await,
        Err(StoreError::KeyExists)
    ));
    let generated = handle.generate_keys(true).await.unwrap();
    assert_eq!(generated.old_public_key, "pub(server-private)");
    assert_eq!(generated.new_public_key, "pub(fresh-private)");
    assert_eq!(generated.created_at, "2024-06-01T12:00:00.000Z");
    assert_eq!(generated.peers_to_notify.len(), 1);
    assert_eq!(generated.peers_to_notify[0].index, 0);
    assert_eq!(generated.peers_to_notify[0].public_key, "laptop-pub");

    assert_eq!(
        handle.key_status().await,
        KeyStatus::Valid { remaining_days: 30 }
    );
    let on_disk = read(tmp.path(), "wg0").await;
    assert!(on_disk.contains("# Key Creation = 2024-06-01T12:00:00.000Z\n"));
    assert!(on_disk.contains("PrivateKey = fresh-private\n"));

    handle.delete_peer(0).await.unwrap();
}

#[tokio::test]
async fn external_edit_is_detected() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    handle.set_peer_enabled(0, false).await.unwrap();
    write(tmp.path(), "wg0", EXPIRED.replace("2024-01-01", "2024-05-30").as_str()).await;

    let err = handle.save().await.unwrap_err();
    assert!(matches!(err, StoreError::ModifiedOnDisk(_)));

    let handle = store.reload("wg0").await.unwrap();
    let config = handle.snapshot().await;
    assert_eq!(config.interface.key_expiry_days, 30);
    assert!(config.peers[0].enabled);
    handle.set_peer_enabled(0, false).await.unwrap();
    handle.save().await.unwrap();
}

#[tokio::test]
async fn failed_key_generation_keeps_old_keys() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    write(tmp.path(), "wg0", EXPIRED).await;
    let err = handle.generate_keys(true).await.unwrap_err();
    assert!(matches!(err, StoreError::ModifiedOnDisk(_)));

    let iface = handle.snapshot().await.interface;
    assert_eq!(iface.private_key, "server-private");
    assert_eq!(iface.public_key, "pub(server-private)");
    assert_eq!(iface.key_creation_date.as_deref(), Some("2024-05-01T00:00:00.000Z"));
    assert_eq!(read(tmp.path(), "wg0").await, EXPIRED);
}

#[tokio::test]
async fn first_key_generation_has_no_peers_to_notify() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    let generated = handle.generate_keys(false).await.unwrap();
    assert!(generated.old_public_key.is_empty());
    assert!(generated.peers_to_notify.is_empty());
}

#[tokio::test]
async fn huge_expiry_window_does_not_block_writes() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());
    let handle = store.open("wg0").await.unwrap();

    handle
        .configure(InterfaceUpdate {
            address: Some("10.0.0.1/24".into()),
            key_expiry_days: Some(u32::MAX),
            ..InterfaceUpdate::default()
        })
        .await;
    assert!(!handle.key_status().await.is_expired());
    handle.set_peer_enabled(0, false).await.unwrap();
    handle.save().await.unwrap();

    let on_disk = read(tmp.path(), "wg0").await;
    assert!(on_disk.contains(&format!("# Key Expiry Days = {}\n", u32::MAX)));
}

#[tokio::test]
async fn list_interfaces_summarizes_conf_files() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg1", CONFIGURED).await;
    write(tmp.path(), "wg0", "[Interface]\nPrivateKey = broken\nAddress = 10.9.0.1/24\n").await;
    tokio::fs::write(tmp.path().join("notes.txt"), "ignored").await.unwrap();
    let store = store_in(tmp.path());

    let list = store.list_interfaces().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "wg0");
    assert_eq!(list[0].public_key, "");
    assert_eq!(list[0].address, "10.9.0.1/24");
    assert_eq!(list[1].name, "wg1");
    assert_eq!(list[1].public_key, "pub(server-private)");
}

#[tokio::test]
async fn list_interfaces_in_missing_dir_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store_in(&tmp.path().join("absent"));
    assert!(store.list_interfaces().await.unwrap().is_empty());
}

#[tokio::test]
async fn evict_drops_unsaved_changes() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "wg0", CONFIGURED).await;
    let store = store_in(tmp.path());

    store.open("wg0").await.unwrap().delete_peer(0).await.unwrap();
    assert!(store.evict("wg0"));
    assert!(!store.evict("wg0"));
    assert_eq!(store.open("wg0").await.unwrap().snapshot().await.peers.len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn saved_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("nested");
    let store = ConfigStore::new(&dir);
    let handle = store.open("wg0").await.unwrap();
    handle.generate_keys(false).await.unwrap();

    let path = handle.path().await;
    let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    let config = parse(&read(&dir, "wg0").await);
    let public = X25519Keys.derive_public_key(&config.interface.private_key).unwrap();
    assert_eq!(handle.snapshot().await.interface.public_key, public);
}
