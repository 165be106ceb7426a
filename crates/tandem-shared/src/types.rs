use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SharedError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn short(&self) -> String {
                self.0.simple().to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = SharedError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| SharedError::InvalidId {
                        kind: $label,
                        value: s.to_string(),
                    })
            }
        }
    };
}

uuid_id!(
    /// Stable dateable identity of a user. Everything in the engine keys on
    /// this, never on the auth-layer user id.
    ProfileId,
    "profile"
);
uuid_id!(MatchId, "match");
uuid_id!(ConversationId, "conversation");
uuid_id!(MessageId, "message");

/// Direction of a swipe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Like,
    Pass,
    SuperLike,
}

impl Direction {
    /// `like` and `super_like` both count as interest for matching.
    pub fn is_like(self) -> bool {
        matches!(self, Self::Like | Self::SuperLike)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Pass => "pass",
            Self::SuperLike => "super_like",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "pass" => Ok(Self::Pass),
            "super_like" => Ok(Self::SuperLike),
            other => Err(SharedError::InvalidDirection(other.to_string())),
        }
    }
}

/// Moderation flags of a profile, as seen by the engine (read-only).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileStatus {
    pub active: bool,
    pub banned: bool,
}

impl ProfileStatus {
    pub fn can_interact(&self) -> bool {
        self.active && !self.banned
    }
}

/// Unordered profile pair in canonical form: `low < high`.
///
/// A match row is keyed by this, so uniqueness per pair is a plain equality
/// constraint on `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    low: ProfileId,
    high: ProfileId,
}

impl PairKey {
    /// Returns `None` for a self-pair.
    pub fn new(a: ProfileId, b: ProfileId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> ProfileId {
        self.low
    }

    pub fn high(&self) -> ProfileId {
        self.high
    }

    pub fn contains(&self, id: ProfileId) -> bool {
        self.low == id || self.high == id
    }

    /// The other member of the pair, if `id` belongs to it.
    pub fn other(&self, id: ProfileId) -> Option<ProfileId> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = ProfileId::new();
        let b = ProfileId::new();
        let ab = PairKey::new(a, b).unwrap();
        let ba = PairKey::new(b, a).unwrap();
        assert_eq!(ab, ba);
        assert!(ab.low() < ab.high());
        assert_eq!(ab.other(a), Some(b));
        assert_eq!(ab.other(ProfileId::new()), None);
    }

    #[test]
    fn pair_key_rejects_self_pair() {
        let a = ProfileId::new();
        assert!(PairKey::new(a, a).is_none());
    }

    #[test]
    fn uuid_order_matches_string_order() {
        for _ in 0..64 {
            let a = ProfileId::new();
            let b = ProfileId::new();
            assert_eq!(a.cmp(&b), a.to_string().cmp(&b.to_string()));
        }
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("super_like".parse::<Direction>().unwrap(), Direction::SuperLike);
        assert!(Direction::SuperLike.is_like());
        assert!(!Direction::Pass.is_like());
        assert!("dislike".parse::<Direction>().is_err());
        let json = serde_json::to_string(&Direction::SuperLike).unwrap();
        assert_eq!(json, "\"super_like\"");
    }

    #[test]
    fn profile_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<ProfileId>().is_err());
    }
}
