//! Static feature table.
//!
//! Every namespace we advertise (or used to advertise as part of a legacy
//! bundle) is listed here together with the derived flag bits it maps to.
//! The table is the only source for [`CapsFlags`] derivation; namespaces not
//! listed are still tracked by a [`CapabilitySet`](crate::CapabilitySet) but
//! contribute no flag.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::ns;

/// Version tag carried by fixed features.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Legacy bundle names (XEP-0115 v1.3 `ext` tokens).
pub const BUNDLE_VOICE_V1: &str = "voice-v1";
pub const BUNDLE_JINGLE_AUDIO: &str = "jingle-audio";
pub const BUNDLE_JINGLE_VIDEO: &str = "jingle-video";
pub const BUNDLE_OLPC_1: &str = "olpc1";

/// Derived capability bits for the well-known features.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapsFlags(u32);

impl CapsFlags {
    pub const NONE: Self = Self(0);
    pub const GOOGLE_TRANSPORT_P2P: Self = Self(1 << 0);
    pub const GOOGLE_VOICE: Self = Self(1 << 1);
    pub const JINGLE: Self = Self(1 << 2);
    pub const JINGLE_DESCRIPTION_AUDIO: Self = Self(1 << 3);
    pub const JINGLE_DESCRIPTION_VIDEO: Self = Self(1 << 4);
    pub const CHAT_STATES: Self = Self(1 << 5);
    pub const SI: Self = Self(1 << 6);
    pub const IBB: Self = Self(1 << 7);
    pub const SI_TUBES: Self = Self(1 << 8);
    pub const OLPC_1: Self = Self(1 << 9);
    /// Sender runs a client release with known protocol bugs. Derived from
    /// the disco identity, never from declared features.
    pub const KNOWN_BUGGY_PEER: Self = Self(1 << 10);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for CapsFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for CapsFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for CapsFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for CapsFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapsFlags({:#06x})", self.0)
    }
}

/// How a table entry is advertised by us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
    /// Always advertised.
    Fixed,
    /// Kept only so that legacy bundle advertisements can be resolved.
    BundleCompat,
    /// Advertised when the corresponding subsystem is enabled.
    Optional,
}

/// One entry of the static feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feature {
    /// Bundle name, or [`VERSION`] for fixed features.
    pub bundle: &'static str,
    pub ns: &'static str,
    pub flags: CapsFlags,
    pub feature_type: FeatureType,
}

impl Feature {
    const fn fixed(ns: &'static str, flags: CapsFlags) -> Self {
        Self {
            bundle: VERSION,
            ns,
            flags,
            feature_type: FeatureType::Fixed,
        }
    }

    const fn bundle(bundle: &'static str, ns: &'static str, flags: CapsFlags) -> Self {
        Self {
            bundle,
            ns,
            flags,
            feature_type: FeatureType::BundleCompat,
        }
    }

    const fn optional(bundle: &'static str, ns: &'static str, flags: CapsFlags) -> Self {
        Self {
            bundle,
            ns,
            flags,
            feature_type: FeatureType::Optional,
        }
    }
}

pub static FEATURES: &[Feature] = &[
    Feature::fixed(ns::GOOGLE_FEAT_SESSION, CapsFlags::NONE),
    Feature::fixed(ns::GOOGLE_TRANSPORT_P2P, CapsFlags::GOOGLE_TRANSPORT_P2P),
    Feature::fixed(ns::JINGLE, CapsFlags::JINGLE),
    Feature::fixed(ns::CHAT_STATES, CapsFlags::CHAT_STATES),
    Feature::fixed(ns::NICK, CapsFlags::NONE),
    Feature::fixed(ns::NICK_NOTIFY, CapsFlags::NONE),
    Feature::fixed(ns::SI, CapsFlags::SI),
    Feature::fixed(ns::IBB, CapsFlags::IBB),
    Feature::fixed(ns::TUBES, CapsFlags::SI_TUBES),
    Feature::bundle(BUNDLE_VOICE_V1, ns::GOOGLE_FEAT_VOICE, CapsFlags::GOOGLE_VOICE),
    Feature::bundle(
        BUNDLE_JINGLE_AUDIO,
        ns::JINGLE_DESCRIPTION_AUDIO,
        CapsFlags::JINGLE_DESCRIPTION_AUDIO,
    ),
    Feature::bundle(
        BUNDLE_JINGLE_VIDEO,
        ns::JINGLE_DESCRIPTION_VIDEO,
        CapsFlags::JINGLE_DESCRIPTION_VIDEO,
    ),
    Feature::optional(BUNDLE_OLPC_1, ns::OLPC_BUDDY_PROPS_NOTIFY, CapsFlags::OLPC_1),
    Feature::optional(BUNDLE_OLPC_1, ns::OLPC_ACTIVITIES_NOTIFY, CapsFlags::OLPC_1),
    Feature::optional(BUNDLE_OLPC_1, ns::OLPC_CURRENT_ACTIVITY_NOTIFY, CapsFlags::OLPC_1),
    Feature::optional(BUNDLE_OLPC_1, ns::OLPC_ACTIVITY_PROPS_NOTIFY, CapsFlags::OLPC_1),
];

/// Table entries whose flag bits are all contained in `flags`.
///
/// Entries with no flag bits are always included.
pub fn features_for(flags: CapsFlags) -> impl Iterator<Item = &'static Feature> {
    FEATURES.iter().filter(move |f| flags.contains(f.flags))
}

/// Flags we advertise before any negotiation: the union of all fixed features.
pub fn initial_caps() -> CapsFlags {
    FEATURES
        .iter()
        .filter(|f| f.feature_type == FeatureType::Fixed)
        .fold(CapsFlags::NONE, |acc, f| acc | f.flags)
}

/// Look up the table entry for a namespace.
pub fn feature_by_ns(ns: &str) -> Option<&'static Feature> {
    FEATURES.iter().find(|f| f.ns == ns)
}
