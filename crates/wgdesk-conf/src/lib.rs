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

//! wgdesk-conf: reading, writing and managing WireGuard configuration files.
//!
//! The file format is the `wg-quick` INI dialect with two conventions on
//! top: a peer is disabled by commenting out its whole stanza, and metadata
//! (peer names, key creation time, key expiry window) lives in comment lines
//! shaped like directives.
//!
//! - [`lex`] classifies lines into tokens.
//! - [`parse`] folds tokens into a [`Configuration`](wgdesk_types::Configuration).
//! - [`render`] writes a configuration back out.
//! - [`lifecycle`] evaluates key expiry.
//! - [`keys`] derives and generates key material.
//! - [`store`] owns per-interface state and the rules around saving it.

pub mod keys;
pub mod lex;
pub mod lifecycle;
pub mod parse;
pub mod render;
pub mod store;

pub use keys::{KeyDeriver, KeyError, KeyGenerator, X25519Keys};
pub use lifecycle::{KeyStatus, is_expired, key_status, remaining_days};
pub use parse::{Diagnostic, ParseReport, SkipReason, parse, parse_report, parse_with_keys};
pub use render::serialize;
pub use store::{
    ConfigStore, GeneratedKeys, InterfaceHandle, InterfaceSummary, PeerNotice, StoreError,
};
