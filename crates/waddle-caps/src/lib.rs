//! Peer capability tracking for the Waddle XMPP stack.
//!
//! - [`CapabilitySet`]: interned set of feature namespaces a peer advertises
//! - [`FeatureRegistry`]/[`FeaturePool`]: shared, reference-counted interning
//! - [`feature`]: the static table mapping namespaces to [`CapsFlags`]
//! - [`CapsCache`]: XEP-0115 node → capabilities cache with legacy bundles
//! - [`quirks`]: flags derived from the peer's software identity

pub mod cache;
pub mod error;
pub mod feature;
pub mod ns;
pub mod pool;
pub mod quirks;
pub mod set;

pub use cache::{verification_hash, CachedCaps, Caps, CapsCache, Identity, Resolution};
pub use error::CapsError;
pub use feature::{features_for, initial_caps, CapsFlags, Feature, FeatureType, FEATURES};
pub use pool::{FeatureId, FeaturePool, FeatureRegistry};
pub use set::{parse_caps, CapabilitySet};
