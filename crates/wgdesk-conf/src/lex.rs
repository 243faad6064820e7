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

//! Line tokenizer for configuration files.
//!
//! A `#` in these files means one of two things: a disabled directive or a
//! metadata comment. The tokenizer settles that per line so the parser only
//! deals with typed tokens.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Interface,
    Peer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    Name,
    KeyCreation,
    KeyExpiryDays,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    SectionMarker { kind: SectionKind, commented: bool },
    Metadata { key: MetadataKey, value: String },
    Directive { key: String, value: String, commented: bool },
    EmptyKey { commented: bool },
    Malformed { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// 1-based line number in the source text.
    pub line: usize,
    pub kind: TokenKind,
}

pub fn tokenize(text: &str) -> impl Iterator<Item = Token> + '_ {
    // Editors on some platforms save a leading byte-order mark.
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.lines()
        .enumerate()
        .filter_map(|(i, raw)| lex_line(raw).map(|kind| Token { line: i + 1, kind }))
}

/// Classify a single line. Blank lines (including a lone `#`) yield `None`.
pub fn lex_line(raw: &str) -> Option<TokenKind> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (commented, clean) = match trimmed.strip_prefix('#') {
        Some(rest) => (true, rest.trim()),
        None => (false, trimmed),
    };
    if clean.is_empty() {
        return None;
    }

    // Name metadata is checked before section markers and directives.
    if commented && starts_with_ignore_case(clean, "name =") {
        let value = clean
            .split_once('=')
            .map(|(_, rest)| rest.trim())
            .unwrap_or_default();
        return Some(TokenKind::Metadata {
            key: MetadataKey::Name,
            value: value.to_string(),
        });
    }

    match clean {
        "[Interface]" => {
            return Some(TokenKind::SectionMarker {
                kind: SectionKind::Interface,
                commented,
            });
        }
        "[Peer]" => {
            return Some(TokenKind::SectionMarker {
                kind: SectionKind::Peer,
                commented,
            });
        }
        _ => {}
    }

    let Some((key, value)) = clean.split_once('=') else {
        return Some(TokenKind::Malformed {
            text: clean.to_string(),
        });
    };
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return Some(TokenKind::EmptyKey { commented });
    }

    if commented {
        let meta = match key.to_ascii_lowercase().as_str() {
            "key creation" => Some(MetadataKey::KeyCreation),
            "key expiry days" => Some(MetadataKey::KeyExpiryDays),
            _ => None,
        };
        if let Some(key) = meta {
            return Some(TokenKind::Metadata {
                key,
                value: value.to_string(),
            });
        }
    }

    Some(TokenKind::Directive {
        key: key.to_string(),
        value: value.to_string(),
        commented,
    })
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}
