//! Asset records as seen by the index and its callers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asset flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetFlags(pub u32);

impl AssetFlags {
    pub const NORMAL: AssetFlags = AssetFlags(0);
    pub const MAPTILE: AssetFlags = AssetFlags(1);
    pub const REWRITABLE: AssetFlags = AssetFlags(2);
    pub const COLLECTABLE: AssetFlags = AssetFlags(4);

    pub fn contains(self, other: AssetFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for AssetFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("Normal");
        }
        let mut names = Vec::new();
        if self.contains(Self::MAPTILE) {
            names.push("Maptile");
        }
        if self.contains(Self::REWRITABLE) {
            names.push("Rewritable");
        }
        if self.contains(Self::COLLECTABLE) {
            names.push("Collectable");
        }
        let unknown = self.0 & !0b111;
        if unknown != 0 {
            return write!(f, "{} (+{:#x})", names.join(" | "), unknown);
        }
        f.write_str(&names.join(" | "))
    }
}

/// Descriptive metadata of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub id: Uuid,
    /// Asset type code (texture, sound, script, ...)
    pub asset_type: i8,
    pub name: String,
    pub description: String,
    pub content_type: String,
    pub flags: AssetFlags,
    pub creator_id: String,
    /// Creation time, unix seconds
    pub created: i64,
    /// Last recorded access, unix seconds
    pub access_time: i64,
}

impl AssetMetadata {
    /// Metadata for a new asset of `asset_type`; the id is nil until stored.
    pub fn new(asset_type: i8, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            asset_type,
            name: name.into(),
            description: String::new(),
            content_type: String::new(),
            flags: AssetFlags::NORMAL,
            creator_id: String::new(),
            created: 0,
            access_time: 0,
        }
    }
}

/// An asset: metadata plus content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub metadata: AssetMetadata,
    pub data: Vec<u8>,
}

impl Asset {
    pub fn new(asset_type: i8, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: AssetMetadata::new(asset_type, name),
            data: data.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.metadata.id
    }
}

/// What the index stores per asset ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub metadata: AssetMetadata,
    /// Content hash of the asset data
    pub hash: String,
}

/// Well-known asset type codes.
pub mod asset_type {
    pub const TEXTURE: i8 = 0;
    pub const SOUND: i8 = 1;
    pub const CALLING_CARD: i8 = 2;
    pub const LANDMARK: i8 = 3;
    pub const CLOTHING: i8 = 5;
    pub const OBJECT: i8 = 6;
    pub const NOTECARD: i8 = 7;
    pub const SCRIPT: i8 = 10;
    pub const SCRIPT_BYTECODE: i8 = 11;
    pub const BODYPART: i8 = 13;
    pub const ANIMATION: i8 = 20;
    pub const GESTURE: i8 = 21;
    pub const MESH: i8 = 49;
}

/// Human-readable name of an asset type code.
pub fn type_name(code: i8) -> &'static str {
    match code {
        asset_type::TEXTURE => "texture",
        asset_type::SOUND => "sound",
        asset_type::CALLING_CARD => "callingcard",
        asset_type::LANDMARK => "landmark",
        asset_type::CLOTHING => "clothing",
        asset_type::OBJECT => "object",
        asset_type::NOTECARD => "notecard",
        asset_type::SCRIPT => "script",
        asset_type::SCRIPT_BYTECODE => "script-bytecode",
        asset_type::BODYPART => "bodypart",
        asset_type::ANIMATION => "animation",
        asset_type::GESTURE => "gesture",
        asset_type::MESH => "mesh",
        _ => "unknown",
    }
}

/// MIME type used when a stored asset carries none.
pub fn default_content_type(code: i8) -> &'static str {
    match code {
        asset_type::TEXTURE => "image/x-j2c",
        asset_type::SOUND => "audio/ogg",
        asset_type::CALLING_CARD => "application/vnd.ll.callingcard",
        asset_type::LANDMARK => "application/vnd.ll.landmark",
        asset_type::CLOTHING => "application/vnd.ll.clothing",
        asset_type::OBJECT => "application/vnd.ll.primitive",
        asset_type::NOTECARD => "application/vnd.ll.notecard",
        asset_type::SCRIPT => "application/vnd.ll.lsltext",
        asset_type::SCRIPT_BYTECODE => "application/vnd.ll.lslbyte",
        asset_type::BODYPART => "application/vnd.ll.bodypart",
        asset_type::ANIMATION => "application/vnd.ll.animation",
        asset_type::GESTURE => "application/vnd.ll.gesture",
        asset_type::MESH => "application/vnd.ll.mesh",
        _ => "application/octet-stream",
    }
}

/// Current time in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_display() {
        assert_eq!(AssetFlags::NORMAL.to_string(), "Normal");
        assert_eq!(AssetFlags(1 | 4).to_string(), "Maptile | Collectable");
        assert_eq!(AssetFlags(2 | 0x100).to_string(), "Rewritable (+0x100)");
    }

    #[test]
    fn test_new_asset_has_nil_id() {
        let asset = Asset::new(asset_type::NOTECARD, "note", b"text".to_vec());
        assert!(asset.id().is_nil());
        assert_eq!(asset.metadata.name, "note");
    }

    #[test]
    fn test_content_type_defaults() {
        assert_eq!(default_content_type(asset_type::TEXTURE), "image/x-j2c");
        assert_eq!(default_content_type(-7), "application/octet-stream");
        assert_eq!(type_name(asset_type::SCRIPT), "script");
    }
}
