//! Hash → directory fan-out.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Directory layout of the committed tier.
///
/// This is a deployment-time constant: a store must never mix layouts, and
/// nothing about the layout is recorded per blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShardLayout {
    /// `ab/cd/ef/gh/<hash>.gz`, 256 entries per directory.
    #[default]
    FourLevel,
    /// `abc/def/<hash>.gz`, 4096 entries per directory.
    TwoLevel,
}

impl ShardLayout {
    /// Number of nested directory levels.
    pub const fn levels(self) -> usize {
        match self {
            ShardLayout::FourLevel => 4,
            ShardLayout::TwoLevel => 2,
        }
    }

    /// Hex characters consumed per level.
    pub const fn width(self) -> usize {
        match self {
            ShardLayout::FourLevel => 2,
            ShardLayout::TwoLevel => 3,
        }
    }

    /// Relative directory for a hex digest.
    ///
    /// Total on any input: a string shorter than `levels * width` simply
    /// yields fewer levels.
    pub fn shard_path(self, hash: &str) -> PathBuf {
        let width = self.width();
        let mut path = PathBuf::new();
        for level in 0..self.levels() {
            let start = level * width;
            match hash.get(start..start + width) {
                Some(segment) => path.push(segment),
                None => break,
            }
        }
        path
    }
}

impl fmt::Display for ShardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardLayout::FourLevel => f.write_str("four-level"),
            ShardLayout::TwoLevel => f.write_str("two-level"),
        }
    }
}

impl FromStr for ShardLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "four-level" | "4" => Ok(ShardLayout::FourLevel),
            "two-level" | "2" => Ok(ShardLayout::TwoLevel),
            other => Err(format!(
                "unknown shard layout {other:?} (expected four-level or two-level)"
            )),
        }
    }
}
