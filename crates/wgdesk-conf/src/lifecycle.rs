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

//! Key pair validity window.
//!
//! A key pair is valid for `key_expiry_days` days from its creation
//! timestamp. Once expired, the hosting layer refuses saves, peer changes and
//! connects until new keys are generated.

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;
use wgdesk_types::InterfaceSection;

/// Remaining days at or below which a key counts as expiring soon.
pub const EXPIRING_SOON_DAYS: i64 = 7;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyStatus {
    /// No creation timestamp is recorded.
    Unset,
    Valid { remaining_days: i64 },
    ExpiringSoon { remaining_days: i64 },
    /// `remaining_days` is zero or negative.
    Expired { remaining_days: i64 },
}

impl KeyStatus {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    pub fn remaining_days(&self) -> Option<i64> {
        match *self {
            Self::Unset => None,
            Self::Valid { remaining_days }
            | Self::ExpiringSoon { remaining_days }
            | Self::Expired { remaining_days } => Some(remaining_days),
        }
    }
}

/// Parse the recorded creation timestamp. Accepts RFC 3339 and bare
/// `YYYY-MM-DD` dates (midnight UTC).
pub fn key_created_at(iface: &InterfaceSection) -> Option<DateTime<Utc>> {
    let raw = iface.key_creation_date.as_deref()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    warn!(value = %raw, "unparseable key creation date, treating key as unset");
    None
}

/// End of the validity window. A window past the representable range
/// saturates at [`DateTime::<Utc>::MAX_UTC`], so the key never expires.
pub fn expires_at(iface: &InterfaceSection) -> Option<DateTime<Utc>> {
    let created = key_created_at(iface)?;
    let expiry = Duration::try_days(i64::from(iface.key_expiry_days))
        .and_then(|window| created.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    Some(expiry)
}

pub fn is_expired(iface: &InterfaceSection, now: DateTime<Utc>) -> bool {
    expires_at(iface).is_some_and(|expiry| now > expiry)
}

/// Whole days left until expiry, rounded up. Negative once expired.
pub fn remaining_days(iface: &InterfaceSection, now: DateTime<Utc>) -> Option<i64> {
    let expiry = expires_at(iface)?;
    let millis = (expiry - now).num_milliseconds() as f64;
    Some((millis / MILLIS_PER_DAY).ceil() as i64)
}

pub fn key_status(iface: &InterfaceSection, now: DateTime<Utc>) -> KeyStatus {
    let Some(remaining_days) = remaining_days(iface, now) else {
        return KeyStatus::Unset;
    };
    if is_expired(iface, now) {
        KeyStatus::Expired { remaining_days }
    } else if remaining_days <= EXPIRING_SOON_DAYS {
        KeyStatus::ExpiringSoon { remaining_days }
    } else {
        KeyStatus::Valid { remaining_days }
    }
}

/// Timestamp format written into `# Key Creation`.
pub fn format_creation_date(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
