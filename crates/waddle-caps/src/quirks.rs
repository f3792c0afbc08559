//! Client-version sniffing.
//!
//! Some peers are identified by the software name in their disco#info
//! identity rather than by anything they declare as a feature.

use minidom::Element;
use tracing::debug;

use crate::feature::CapsFlags;

const BUGGY_CLIENT_PREFIX: &str = "Telepathy Gabble 0.7.";
const BUGGY_MICRO_VERSIONS: std::ops::Range<u32> = 16..29;

/// Flags derived from the `<identity/>` children of a disco#info result.
///
/// Returns [`CapsFlags::KNOWN_BUGGY_PEER`] if any identity names a client
/// release in the affected range, otherwise no flags.
pub fn detect(query: &Element) -> CapsFlags {
    let buggy = query
        .children()
        .filter(|child| child.name() == "identity")
        .filter_map(|identity| identity.attr("name"))
        .any(is_buggy_client_name);

    if buggy {
        debug!("peer identity matches a known-buggy client release");
        CapsFlags::KNOWN_BUGGY_PEER
    } else {
        CapsFlags::NONE
    }
}

fn is_buggy_client_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(BUGGY_CLIENT_PREFIX) else {
        return false;
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<u32>()
        .map(|micro| BUGGY_MICRO_VERSIONS.contains(&micro))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns;

    fn query_with_identity(name: &str) -> Element {
        Element::builder("query", ns::DISCO_INFO)
            .append(
                Element::builder("identity", ns::DISCO_INFO)
                    .attr("category", "client")
                    .attr("type", "pc")
                    .attr("name", name)
                    .build(),
            )
            .build()
    }

    #[test]
    fn affected_release_sets_flag() {
        let query = query_with_identity("Telepathy Gabble 0.7.20");
        assert_eq!(detect(&query), CapsFlags::KNOWN_BUGGY_PEER);
    }

    #[test]
    fn range_bounds() {
        assert!(is_buggy_client_name("Telepathy Gabble 0.7.16"));
        assert!(is_buggy_client_name("Telepathy Gabble 0.7.28"));
        assert!(!is_buggy_client_name("Telepathy Gabble 0.7.29"));
        assert!(!is_buggy_client_name("Telepathy Gabble 0.7.15"));
    }

    #[test]
    fn single_digit_micro_is_not_affected() {
        let query = query_with_identity("Telepathy Gabble 0.7.9");
        assert_eq!(detect(&query), CapsFlags::NONE);
    }

    #[test]
    fn fixed_release_is_not_affected() {
        let query = query_with_identity("Telepathy Gabble 0.7.29");
        assert_eq!(detect(&query), CapsFlags::NONE);
    }

    #[test]
    fn other_clients_are_not_affected() {
        assert_eq!(detect(&query_with_identity("Psi 0.7.20")), CapsFlags::NONE);
        assert!(!is_buggy_client_name("Telepathy Gabble 0.8.20"));
        assert!(!is_buggy_client_name("Telepathy Gabble 0.7."));
    }

    #[test]
    fn missing_identity_leaves_flag_unset() {
        let query = Element::builder("query", ns::DISCO_INFO).build();
        assert_eq!(detect(&query), CapsFlags::NONE);
    }
}
