use super::endpoint::MembershipSet;

/// Presence-only difference between two membership sets.
///
/// Endpoints present in both sets are not compared field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    /// Endpoints that disappeared, taken from the old set.
    pub offline: MembershipSet,
    /// Endpoints that appeared, taken from the new set.
    pub add_online: MembershipSet,
}

impl MembershipDiff {
    /// Compute the difference going from `old` to `new`.
    pub fn between(old: &MembershipSet, new: &MembershipSet) -> Self {
        Self {
            offline: old.difference(new),
            add_online: new.difference(old),
        }
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.offline.is_empty() && self.add_online.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::Endpoint;

    fn set(entries: &[(&str, i64)]) -> MembershipSet {
        entries
            .iter()
            .map(|(host, weight)| Endpoint {
                host: host.to_string(),
                port: 80,
                protocol: "nova".to_string(),
                namespace: "default".to_string(),
                service_name: "orders".to_string(),
                status: 1,
                weight: *weight,
            })
            .collect()
    }

    #[test]
    fn test_added_and_removed() {
        let old = set(&[("a", 1), ("b", 2)]);
        let new = set(&[("b", 2), ("c", 3)]);

        let diff = MembershipDiff::between(&old, &new);
        assert_eq!(diff.offline.keys().collect::<Vec<_>>(), vec!["a:80"]);
        assert_eq!(diff.add_online.keys().collect::<Vec<_>>(), vec!["c:80"]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_identical_sets() {
        let old = set(&[("a", 1), ("b", 2)]);
        let diff = MembershipDiff::between(&old, &old.clone());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_changed_payload_is_not_a_change() {
        let old = set(&[("a", 1)]);
        let new = set(&[("a", 50)]);
        assert!(MembershipDiff::between(&old, &new).is_empty());
    }

    #[test]
    fn test_from_empty() {
        let new = set(&[("a", 1), ("b", 1)]);
        let diff = MembershipDiff::between(&MembershipSet::new(), &new);
        assert!(diff.offline.is_empty());
        assert_eq!(diff.add_online, new);
    }
}
