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

//! Reassembles a [`Configuration`] from the token stream.
//!
//! Parsing is a fold over [`Token`]s with [`ParseState`] as the accumulator.
//! It never fails: lines that cannot be placed are dropped and, through
//! [`parse_report`], described in a [`Diagnostic`].

use std::fmt;

use serde::Serialize;
use wgdesk_types::{Configuration, DEFAULT_KEY_EXPIRY_DAYS, InterfaceSection, Peer};

use crate::keys::{self, KeyDeriver};
use crate::lex::{self, MetadataKey, SectionKind, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    None,
    Interface,
    Peer,
}

/// Why a line did not contribute to the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A directive before any section marker.
    OrphanedDirective { key: String },
    /// A directive with no matching field in its section.
    UnknownDirective { key: String },
    /// `= value` with nothing on the left.
    EmptyKey,
    /// A line that is neither a section, a directive nor metadata.
    Unrecognized { text: String },
    /// A `# Name =` comment not followed by a peer marker.
    OrphanedName { name: String },
    /// Key metadata written as a live directive.
    LiveMetadataKey { key: String },
    /// Key metadata outside the `[Interface]` stanza.
    MisplacedMetadata { key: String },
    /// `# Key Expiry Days` that is not a positive integer.
    InvalidExpiryDays { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.reason {
            SkipReason::OrphanedDirective { key } => {
                write!(f, "`{key}` appears before any section")
            }
            SkipReason::UnknownDirective { key } => write!(f, "unknown directive `{key}`"),
            SkipReason::EmptyKey => write!(f, "directive has an empty key"),
            SkipReason::Unrecognized { text } => write!(f, "ignored `{text}`"),
            SkipReason::OrphanedName { name } => {
                write!(f, "name `{name}` is not followed by a peer")
            }
            SkipReason::LiveMetadataKey { key } => {
                write!(f, "`{key}` is only read from a comment")
            }
            SkipReason::MisplacedMetadata { key } => {
                write!(f, "`{key}` is only read under [Interface]")
            }
            SkipReason::InvalidExpiryDays { value } => write!(
                f,
                "invalid key expiry days `{value}`, using {DEFAULT_KEY_EXPIRY_DAYS}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingName {
    line: usize,
    name: String,
}

/// Accumulator of the parse fold.
#[derive(Debug, Clone, Default)]
pub struct ParseState {
    pub config: Configuration,
    pub section: Section,
    pending_name: Option<PendingName>,
    /// Whether the marker of the current peer was commented out.
    peer_disabled: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_name(&self) -> Option<&str> {
        self.pending_name.as_ref().map(|p| p.name.as_str())
    }

    /// Apply one token.
    pub fn step(&mut self, token: Token) {
        let line = token.line;
        match token.kind {
            TokenKind::Metadata {
                key: MetadataKey::Name,
                value,
            } => {
                if let Some(prev) = self.pending_name.replace(PendingName { line, name: value }) {
                    self.skip(prev.line, SkipReason::OrphanedName { name: prev.name });
                }
            }
            TokenKind::SectionMarker {
                kind: SectionKind::Interface,
                ..
            } => {
                self.section = Section::Interface;
                self.peer_disabled = false;
                if let Some(prev) = self.pending_name.take() {
                    self.skip(prev.line, SkipReason::OrphanedName { name: prev.name });
                }
            }
            TokenKind::SectionMarker {
                kind: SectionKind::Peer,
                commented,
            } => {
                self.section = Section::Peer;
                self.peer_disabled = commented;
                let mut peer = Peer::empty(!commented);
                if let Some(pending) = self.pending_name.take() {
                    peer.name = pending.name;
                }
                self.config.peers.push(peer);
            }
            TokenKind::Metadata { key, value } => self.metadata(line, key, value),
            TokenKind::Directive {
                key,
                value,
                commented,
            } => self.directive(line, key, value, commented),
            TokenKind::EmptyKey { .. } => self.skip(line, SkipReason::EmptyKey),
            TokenKind::Malformed { text } => self.skip(line, SkipReason::Unrecognized { text }),
        }
    }

    /// Finish the fold, reporting a trailing name with no peer.
    pub fn finish(mut self) -> ParseReport {
        if let Some(prev) = self.pending_name.take() {
            self.skip(prev.line, SkipReason::OrphanedName { name: prev.name });
        }
        ParseReport {
            config: self.config,
            diagnostics: self.diagnostics,
        }
    }

    fn metadata(&mut self, line: usize, key: MetadataKey, value: String) {
        if self.section != Section::Interface {
            let key = metadata_label(key).to_string();
            self.skip(line, SkipReason::MisplacedMetadata { key });
            return;
        }

        match key {
            MetadataKey::KeyCreation => {
                self.config.interface.key_creation_date = Some(value);
            }
            MetadataKey::KeyExpiryDays => {
                self.config.interface.key_expiry_days = match leading_digits(&value).parse::<u32>() {
                    Ok(days) if days > 0 => days,
                    _ => {
                        self.skip(line, SkipReason::InvalidExpiryDays { value });
                        DEFAULT_KEY_EXPIRY_DAYS
                    }
                };
            }
            MetadataKey::Name => unreachable!("name metadata is handled in step"),
        }
    }

    fn directive(&mut self, line: usize, key: String, value: String, commented: bool) {
        let lower = key.to_ascii_lowercase();
        match self.section {
            Section::None => self.skip(line, SkipReason::OrphanedDirective { key }),
            Section::Interface => {
                if !commented && is_metadata_key(&lower) {
                    self.skip(line, SkipReason::LiveMetadataKey { key });
                    return;
                }
                match interface_field(&mut self.config.interface, &lower) {
                    Some(field) => *field = value,
                    None => self.skip(line, SkipReason::UnknownDirective { key }),
                }
            }
            Section::Peer => {
                let disabled = self.peer_disabled;
                let Some(peer) = self.config.peers.last_mut() else {
                    return;
                };
                match peer_field(peer, &lower) {
                    Some(field) => *field = value,
                    None => self.skip(line, SkipReason::UnknownDirective { key }),
                }
                // A peer is disabled as a unit, whatever this line looked like.
                if disabled {
                    if let Some(peer) = self.config.peers.last_mut() {
                        peer.enabled = false;
                    }
                }
            }
        }
    }

    fn skip(&mut self, line: usize, reason: SkipReason) {
        self.diagnostics.push(Diagnostic { line, reason });
    }
}

/// Result of [`parse_report`].
#[derive(Debug, Clone)]
pub struct ParseReport {
    pub config: Configuration,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse configuration text. Never fails.
pub fn parse(text: &str) -> Configuration {
    parse_report(text).config
}

/// Parse configuration text and describe every line that was dropped.
pub fn parse_report(text: &str) -> ParseReport {
    lex::tokenize(text)
        .fold(ParseState::new(), |mut state, token| {
            state.step(token);
            state
        })
        .finish()
}

/// Parse, then fill in the interface public key with `deriver`.
///
/// A derivation failure leaves the public key as parsed.
pub fn parse_with_keys(text: &str, deriver: &impl KeyDeriver) -> ParseReport {
    let mut report = parse_report(text);
    keys::populate_public_key(&mut report.config, deriver);
    report
}

fn interface_field<'a>(iface: &'a mut InterfaceSection, key: &str) -> Option<&'a mut String> {
    let field = match key {
        "privatekey" => &mut iface.private_key,
        "publickey" => &mut iface.public_key,
        "address" => &mut iface.address,
        "dns" => &mut iface.dns,
        "listenport" => &mut iface.listen_port,
        "table" => &mut iface.table,
        "mtu" => &mut iface.mtu,
        "preup" => &mut iface.pre_up,
        "postup" => &mut iface.post_up,
        "predown" => &mut iface.pre_down,
        "postdown" => &mut iface.post_down,
        _ => return None,
    };
    Some(field)
}

fn peer_field<'a>(peer: &'a mut Peer, key: &str) -> Option<&'a mut String> {
    let field = match key {
        "name" => &mut peer.name,
        "publickey" => &mut peer.public_key,
        "presharedkey" => &mut peer.preshared_key,
        "endpoint" => &mut peer.endpoint,
        "allowedips" => &mut peer.allowed_ips,
        "persistentkeepalive" => &mut peer.persistent_keepalive,
        _ => return None,
    };
    Some(field)
}

/// Digits at the start of `value`, so `30 days` reads as `30`.
fn leading_digits(value: &str) -> &str {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    &value[..end]
}

fn is_metadata_key(lower: &str) -> bool {
    matches!(lower, "key creation" | "key expiry days")
}

fn metadata_label(key: MetadataKey) -> &'static str {
    match key {
        MetadataKey::Name => "Name",
        MetadataKey::KeyCreation => "Key Creation",
        MetadataKey::KeyExpiryDays => "Key Expiry Days",
    }
}
