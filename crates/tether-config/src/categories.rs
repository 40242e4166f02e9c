//! Alert category bitmask understood by the engine's `alert_mask` setting.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Set of alert categories.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertCategories(u32);

macro_rules! categories {
    ($($(#[$meta:meta])* $name:ident = $bit:expr;)*) => {
        impl AlertCategories {
            $(
                $(#[$meta])*
                pub const $name: Self = Self(1 << $bit);
            )*

            /// Every known category.
            pub const ALL: Self = Self(0 $(| (1 << $bit))*);

            const NAMES: &'static [(&'static str, Self)] = &[$((stringify!($name), Self::$name)),*];
        }
    };
}

categories! {
    /// Errors reported by the engine.
    ERROR = 0;
    /// Peer events.
    PEER = 1;
    /// Port mapping results.
    PORT_MAPPING = 2;
    /// Disk storage events.
    STORAGE = 3;
    /// Tracker responses.
    TRACKER = 4;
    /// Connection attempts.
    CONNECT = 5;
    /// Torrent state changes and removals.
    STATUS = 6;
    /// IP filter blocks.
    IP_BLOCK = 8;
    /// Performance warnings.
    PERFORMANCE_WARNING = 9;
    /// DHT events.
    DHT = 10;
    /// Statistics.
    STATS = 11;
    /// Session debug log.
    SESSION_LOG = 13;
    /// Torrent debug log.
    TORRENT_LOG = 14;
    /// Peer debug log.
    PEER_LOG = 15;
    /// Incoming piece requests.
    INCOMING_REQUEST = 16;
    /// DHT debug log.
    DHT_LOG = 17;
    /// DHT operations.
    DHT_OPERATION = 18;
    /// Port mapping debug log.
    PORT_MAPPING_LOG = 19;
    /// Piece picker log.
    PICKER_LOG = 20;
    /// File completion progress.
    FILE_PROGRESS = 21;
    /// Piece completion progress.
    PIECE_PROGRESS = 22;
    /// Upload events.
    UPLOAD = 23;
    /// Block completion progress.
    BLOCK_PROGRESS = 24;
}

impl AlertCategories {
    /// No categories.
    pub const NONE: Self = Self(0);

    /// Wrap raw bits, keeping unknown ones.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every category in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no category is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits as the signed integer the `alert_mask` setting expects.
    #[must_use]
    pub const fn as_setting(self) -> i32 {
        self.0.cast_signed()
    }
}

impl BitOr for AlertCategories {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AlertCategories {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AlertCategories {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for AlertCategories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "AlertCategories({})", names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_match_engine_values() {
        assert_eq!(AlertCategories::STATUS.bits(), 64);
        assert_eq!(AlertCategories::PERFORMANCE_WARNING.bits(), 512);
        assert_eq!(AlertCategories::BLOCK_PROGRESS.bits(), 1 << 24);
        assert!(!AlertCategories::ALL.contains(AlertCategories::from_bits(1 << 7)));
        assert!(AlertCategories::ALL.contains(AlertCategories::ERROR | AlertCategories::UPLOAD));
    }

    #[test]
    fn debug_lists_set_categories() {
        let set = AlertCategories::ERROR | AlertCategories::STATUS;
        assert_eq!(format!("{set:?}"), "AlertCategories(ERROR | STATUS)");
    }
}
