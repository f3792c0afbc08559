//! Capability sets.

use std::collections::BTreeSet;
use std::fmt;

use minidom::Element;
use tracing::trace;

use crate::feature::{feature_by_ns, features_for, CapsFlags};
use crate::ns;
use crate::pool::{FeatureId, FeaturePool};
use crate::quirks;

/// The set of feature namespaces a peer advertises.
///
/// Features are stored as pool ids, so two sets are only cheap to compare
/// when they were built from the same [`FeaturePool`]. Sets from different
/// pools still compare correctly, by namespace.
#[derive(Clone)]
pub struct CapabilitySet {
    pool: FeaturePool,
    features: BTreeSet<FeatureId>,
}

impl CapabilitySet {
    pub fn new(pool: &FeaturePool) -> Self {
        Self {
            pool: pool.clone(),
            features: BTreeSet::new(),
        }
    }

    /// Build a set from the `<feature var='…'/>` children of a disco#info
    /// `<query/>`. Features without a `var` are skipped.
    pub fn from_stanza(pool: &FeaturePool, query: &Element) -> Self {
        let mut set = Self::new(pool);
        for feature in query.children().filter(|child| child.name() == "feature") {
            match feature.attr("var") {
                Some(var) => set.add(var),
                None => trace!("skipping <feature/> without var"),
            }
        }
        set
    }

    /// Build a set holding every table feature covered by `flags`.
    pub fn from_flags(pool: &FeaturePool, flags: CapsFlags) -> Self {
        let mut set = Self::new(pool);
        for feature in features_for(flags) {
            set.add(feature.ns);
        }
        set
    }

    pub fn add(&mut self, ns: &str) {
        let id = self.pool.intern(ns);
        self.features.insert(id);
    }

    /// Merge every feature of `other` into this set.
    pub fn update(&mut self, other: &CapabilitySet) {
        if self.pool.same_pool(&other.pool) {
            self.features.extend(other.features.iter().copied());
        } else {
            for ns in other.namespaces() {
                self.add(&ns);
            }
        }
    }

    /// Namespaces the pool never saw are never members.
    pub fn has(&self, ns: &str) -> bool {
        self.pool
            .lookup(ns)
            .is_some_and(|id| self.features.contains(&id))
    }

    pub fn clear(&mut self) {
        self.features.clear();
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Visit each namespace in interning order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str),
    {
        for id in &self.features {
            if let Some(ns) = self.pool.inspect(*id) {
                f(&ns);
            }
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.features
            .iter()
            .filter_map(|id| self.pool.inspect(*id))
            .collect()
    }

    /// Flags derived from the static feature table. Namespaces not in the
    /// table contribute nothing.
    pub fn flags(&self) -> CapsFlags {
        let mut flags = CapsFlags::NONE;
        self.for_each(|ns| {
            if let Some(feature) = feature_by_ns(ns) {
                flags |= feature.flags;
            }
        });
        flags
    }

    pub fn pool(&self) -> &FeaturePool {
        &self.pool
    }

    /// Serialise as a disco#info `<query/>`, optionally addressed to `node`.
    pub fn to_query_element(&self, node: Option<&str>) -> Element {
        let mut builder = Element::builder("query", ns::DISCO_INFO);
        if let Some(node) = node {
            builder = builder.attr("node", node);
        }
        for ns in self.namespaces() {
            builder = builder.append(
                Element::builder("feature", ns::DISCO_INFO)
                    .attr("var", ns.as_str())
                    .build(),
            );
        }
        builder.build()
    }
}

impl PartialEq for CapabilitySet {
    fn eq(&self, other: &Self) -> bool {
        if self.pool.same_pool(&other.pool) {
            return self.features == other.features;
        }
        let mine: BTreeSet<String> = self.namespaces().into_iter().collect();
        let theirs: BTreeSet<String> = other.namespaces().into_iter().collect();
        mine == theirs
    }
}

impl Eq for CapabilitySet {}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.namespaces()).finish()
    }
}

/// Flags for a peer: what its feature set maps to in the static table,
/// plus anything the quirk detector finds in the disco#info identity.
pub fn parse_caps(set: &CapabilitySet, query: &Element) -> CapsFlags {
    set.flags() | quirks::detect(query)
}
