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

//! WireGuard key material.
//!
//! Keys are 32-byte Curve25519 values in standard base64, the same encoding
//! `wg genkey` and `wg pubkey` produce.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{debug, warn};
use wgdesk_types::Configuration;
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to decode base64 key: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Computes the public key belonging to a private key.
pub trait KeyDeriver {
    fn derive_public_key(&self, private_key: &str) -> Result<String, KeyError>;
}

/// Produces fresh key material.
pub trait KeyGenerator {
    fn generate_private_key(&self) -> String;
    fn generate_preshared_key(&self) -> String;
}

/// Native Curve25519 implementation of both key capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519Keys;

impl KeyDeriver for X25519Keys {
    fn derive_public_key(&self, private_key: &str) -> Result<String, KeyError> {
        let secret = StaticSecret::from(decode_key(private_key)?);
        let public = PublicKey::from(&secret);
        Ok(BASE64.encode(public.as_bytes()))
    }
}

impl KeyGenerator for X25519Keys {
    fn generate_private_key(&self) -> String {
        let secret = StaticSecret::random_from_rng(OsRng);
        BASE64.encode(secret.to_bytes())
    }

    fn generate_preshared_key(&self) -> String {
        let mut psk = [0u8; 32];
        OsRng.fill_bytes(&mut psk);
        BASE64.encode(psk)
    }
}

pub fn decode_key(b64: &str) -> Result<[u8; 32], KeyError> {
    let bytes = BASE64.decode(b64.trim())?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| KeyError::InvalidLength(len))
}

/// Overwrite `interface.public_key` with the key derived from the private
/// key. Failures are logged and leave the field untouched.
pub fn populate_public_key(config: &mut Configuration, deriver: &impl KeyDeriver) {
    let iface = &mut config.interface;
    if iface.private_key.is_empty() {
        return;
    }
    match deriver.derive_public_key(&iface.private_key) {
        Ok(public_key) => {
            debug!(public_key = %public_key, "derived interface public key");
            iface.public_key = public_key;
        }
        Err(e) => warn!(error = %e, "failed to derive interface public key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // RFC 7748 section 6.1 test vector (Alice).
    const ALICE_PRIVATE: &str = "dwdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LCo=";
    const ALICE_PUBLIC: &str = "hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo=";

    #[test]
    fn derives_known_public_key() {
        let public = X25519Keys.derive_public_key(ALICE_PRIVATE).unwrap();
        assert_eq!(public, ALICE_PUBLIC);
    }

    #[test]
    fn generated_key_round_trips_through_derivation() {
        let private = X25519Keys.generate_private_key();
        assert_eq!(decode_key(&private).unwrap().len(), 32);
        let public = X25519Keys.derive_public_key(&private).unwrap();
        assert_eq!(decode_key(&public).unwrap().len(), 32);
        assert_ne!(private, public);
    }

    #[test]
    fn preshared_keys_differ() {
        let a = X25519Keys.generate_preshared_key();
        let b = X25519Keys.generate_preshared_key();
        assert_eq!(a.len(), 44);
        assert_ne!(a, b);
    }

    #[test_case("not base64!" ; "bad alphabet")]
    #[test_case("AAA=" ; "too short")]
    #[test_case("" ; "empty")]
    fn rejects_invalid_private_keys(key: &str) {
        assert!(X25519Keys.derive_public_key(key).is_err());
    }

    #[test]
    fn populate_overwrites_on_success() {
        let mut config = Configuration::default();
        config.interface.private_key = ALICE_PRIVATE.into();
        config.interface.public_key = "stale".into();
        populate_public_key(&mut config, &X25519Keys);
        assert_eq!(config.interface.public_key, ALICE_PUBLIC);
    }

    #[test]
    fn populate_keeps_field_on_failure() {
        let mut config = Configuration::default();
        config.interface.private_key = "AAA=".into();
        config.interface.public_key = "kept".into();
        populate_public_key(&mut config, &X25519Keys);
        assert_eq!(config.interface.public_key, "kept");
    }
}
