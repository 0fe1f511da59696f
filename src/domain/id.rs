//! Deterministic post identifiers.
//!
//! A [`PostId`] fuses the local account id, the source system tag and the
//! post's foreign id into one string:
//!
//! ```text
//! [account: 2 base-36 chars][source: 2 base-36 chars][foreign id: base-36]
//! ```
//!
//! The fixed-width prefix keeps every (account, source) pair addressable by
//! its first four characters without a separator.

use std::fmt;

use serde::{Deserialize, Serialize};

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Width of the account and source prefixes.
const PREFIX_WIDTH: usize = 2;

// Two base-36 digits cover 0..=1295, so any byte fits the fixed-width prefix.
const _: () = assert!((u8::MAX as usize) < 36 * 36);

/// Local account id as configured. The id space is a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u8);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin system of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Twitter,
}

impl SourceTag {
    pub fn code(self) -> u8 {
        match self {
            SourceTag::Twitter => 0,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SourceTag::Twitter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(account: AccountId, source: SourceTag, foreign_id: u64) -> Self {
        Self(encode(account.0, source.code(), foreign_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode the raw identifier triple. Pure and total over its input domain.
pub fn encode(account: u8, source: u8, foreign_id: u64) -> String {
    let mut out = String::with_capacity(PREFIX_WIDTH * 2 + 13);
    push_padded(&mut out, account as u64);
    push_padded(&mut out, source as u64);
    out.push_str(&base36(foreign_id));
    out
}

fn push_padded(out: &mut String, value: u64) {
    let digits = base36(value);
    for _ in digits.len()..PREFIX_WIDTH {
        out.push('0');
    }
    out.push_str(&digits);
}

pub fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    // Only ASCII digits were pushed.
    String::from_utf8(buf).unwrap_or_default()
}
