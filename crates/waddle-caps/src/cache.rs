//! Entity capabilities (XEP-0115) cache.
//!
//! Peers advertise a `<c node ver [ext]>` element in presence. Each
//! `node#ver` (and, for legacy clients, each `node#ext-token`) names a
//! disco#info result that only needs fetching once. The cache maps those
//! node strings to the capability set we learnt from them.
//!
//! Legacy bundles we know in advance are seeded with [`CapsCache::fill_bundles`].

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dashmap::DashMap;
use minidom::Element;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::feature::{CapsFlags, FEATURES};
use crate::ns;
use crate::pool::FeaturePool;
use crate::set::CapabilitySet;

/// The `<c/>` element from a presence stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    pub node: String,
    pub ver: String,
    /// Hash algorithm; absent for legacy (pre-1.5) advertisements.
    pub hash: Option<String>,
    /// Legacy bundle names.
    pub ext: Vec<String>,
}

impl Caps {
    pub fn new(node: &str, ver: &str) -> Self {
        Self {
            node: node.to_string(),
            ver: ver.to_string(),
            hash: Some("sha-1".to_string()),
            ext: Vec::new(),
        }
    }

    pub fn from_element(elem: &Element) -> Option<Self> {
        if elem.name() != "c" || elem.ns() != ns::CAPS {
            return None;
        }

        let node = elem.attr("node")?.to_string();
        let ver = elem.attr("ver")?.to_string();
        let hash = elem.attr("hash").map(str::to_string);
        let ext = elem
            .attr("ext")
            .map(|ext| ext.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Some(Self {
            node,
            ver,
            hash,
            ext,
        })
    }

    /// Find the `<c/>` child of a presence stanza.
    pub fn from_presence(presence: &Element) -> Option<Self> {
        presence
            .get_child("c", ns::CAPS)
            .and_then(Self::from_element)
    }

    pub fn build_element(&self) -> Element {
        let mut builder = Element::builder("c", ns::CAPS)
            .attr("node", self.node.as_str())
            .attr("ver", self.ver.as_str());
        if let Some(hash) = &self.hash {
            builder = builder.attr("hash", hash.as_str());
        }
        if !self.ext.is_empty() {
            builder = builder.attr("ext", self.ext.join(" "));
        }
        builder.build()
    }

    /// Every disco node this advertisement stands for: `node#ver` first,
    /// then one `node#ext` per bundle.
    pub fn nodes(&self) -> Vec<String> {
        std::iter::once(&self.ver)
            .chain(self.ext.iter())
            .map(|suffix| format!("{}#{}", self.node, suffix))
            .collect()
    }
}

/// What we learnt about one caps node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCaps {
    pub flags: CapsFlags,
    pub features: CapabilitySet,
}

/// Outcome of [`CapsCache::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every node was cached; the merged result.
    Known(CachedCaps),
    /// These nodes still need a disco#info query.
    Missing(Vec<String>),
}

/// Concurrent node → capabilities map.
#[derive(Debug, Clone)]
pub struct CapsCache {
    pool: FeaturePool,
    cache: Arc<DashMap<String, CachedCaps>>,
}

impl CapsCache {
    pub fn new(pool: &FeaturePool) -> Self {
        Self {
            pool: pool.clone(),
            cache: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, node: &str, caps: CachedCaps) {
        debug!(node = %node, features = caps.features.len(), "Caching caps");
        self.cache.insert(node.to_string(), caps);
    }

    pub fn get(&self, node: &str) -> Option<CachedCaps> {
        self.cache.get(node).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, node: &str) -> bool {
        self.cache.contains_key(node)
    }

    pub fn remove(&self, node: &str) -> Option<CachedCaps> {
        self.cache.remove(node).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Seed the legacy bundles whose contents are known without asking.
    ///
    /// Every table entry is reachable as `<our node>#<bundle>`. The Google
    /// client's `voice-v1` bundle is trusted to mean Google voice support.
    pub fn fill_bundles(&self) {
        for feature in FEATURES {
            let node = format!("{}#{}", ns::WADDLE_CAPS_NODE, feature.bundle);
            let mut entry = self.get(&node).unwrap_or_else(|| CachedCaps {
                flags: CapsFlags::NONE,
                features: CapabilitySet::new(&self.pool),
            });
            entry.flags |= feature.flags;
            entry.features.add(feature.ns);
            self.cache.insert(node, entry);
        }

        let mut voice = CapabilitySet::new(&self.pool);
        voice.add(ns::GOOGLE_FEAT_VOICE);
        self.insert(
            &format!("{}#{}", ns::GOOGLE_CAPS_NODE, crate::feature::BUNDLE_VOICE_V1),
            CachedCaps {
                flags: CapsFlags::GOOGLE_VOICE,
                features: voice,
            },
        );
    }

    /// Merge the cached entries for every node `caps` stands for.
    pub fn resolve(&self, caps: &Caps) -> Resolution {
        let mut merged = CachedCaps {
            flags: CapsFlags::NONE,
            features: CapabilitySet::new(&self.pool),
        };
        let mut missing = Vec::new();

        for node in caps.nodes() {
            match self.get(&node) {
                Some(entry) => {
                    merged.flags |= entry.flags;
                    merged.features.update(&entry.features);
                }
                None => missing.push(node),
            }
        }

        if missing.is_empty() {
            Resolution::Known(merged)
        } else {
            Resolution::Missing(missing)
        }
    }
}

/// A disco#info `<identity/>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub category: String,
    pub type_: String,
    pub lang: Option<String>,
    pub name: Option<String>,
}

impl Identity {
    pub fn new(category: &str, type_: &str, name: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            type_: type_.to_string(),
            lang: None,
            name: name.map(str::to_string),
        }
    }

    pub fn client_pc(name: &str) -> Self {
        Self::new("client", "pc", Some(name))
    }
}

/// XEP-0115 §5 verification string, SHA-1 hashed and base64 encoded.
pub fn verification_hash(identities: &[Identity], features: &CapabilitySet) -> String {
    let verification_string = build_verification_string(identities, features);
    let mut hasher = Sha1::new();
    hasher.update(verification_string.as_bytes());
    BASE64.encode(hasher.finalize())
}

fn build_verification_string(identities: &[Identity], features: &CapabilitySet) -> String {
    let mut s = String::new();

    let mut sorted_identities: Vec<_> = identities.iter().collect();
    sorted_identities.sort_by(|a, b| {
        (&a.category, &a.type_, &a.lang, &a.name).cmp(&(&b.category, &b.type_, &b.lang, &b.name))
    });
    for id in sorted_identities {
        s.push_str(&id.category);
        s.push('/');
        s.push_str(&id.type_);
        s.push('/');
        s.push_str(id.lang.as_deref().unwrap_or(""));
        s.push('/');
        s.push_str(id.name.as_deref().unwrap_or(""));
        s.push('<');
    }

    let mut sorted_features = features.namespaces();
    sorted_features.sort();
    for feature in sorted_features {
        s.push_str(&feature);
        s.push('<');
    }

    s
}
