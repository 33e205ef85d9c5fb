//! Ranked instance registrations
//!
//! Registrations are bucketed by the type id they declare. Each bucket is
//! kept sorted: higher ranking first, then earlier declaration first.

use std::cmp::Ordering;

use indexmap::IndexMap;

/// One known instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRegistration {
    /// Instance module id
    pub id: String,
    /// Declared type id
    pub type_id: String,
    /// Priority; higher wins
    pub ranking: f64,
    /// Declaration index, the tie-breaker
    pub order: usize,
}

impl InstanceRegistration {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .ranking
            .partial_cmp(&self.ranking)
            .unwrap_or(Ordering::Equal)
            .then(self.order.cmp(&other.order))
    }
}

/// Registrations by declared type id
#[derive(Debug, Default)]
pub(crate) struct InstanceIndex {
    by_type: IndexMap<String, Vec<InstanceRegistration>>,
    next_order: usize,
}

impl InstanceIndex {
    /// Add a registration, replacing an earlier one with the same id
    pub fn register(&mut self, id: &str, type_id: &str, ranking: f64) -> InstanceRegistration {
        for bucket in self.by_type.values_mut() {
            bucket.retain(|r| r.id != id);
        }

        let registration = InstanceRegistration {
            id: id.to_string(),
            type_id: type_id.to_string(),
            ranking,
            order: self.next_order,
        };
        self.next_order += 1;

        let bucket = self.by_type.entry(type_id.to_string()).or_default();
        let at = bucket
            .binary_search_by(|r| r.rank_cmp(&registration))
            .unwrap_or_else(|i| i);
        bucket.insert(at, registration.clone());
        registration
    }

    /// Declared type ids with at least one registration
    pub fn type_ids(&self) -> Vec<String> {
        self.by_type
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Registration by instance id
    pub fn find(&self, id: &str) -> Option<&InstanceRegistration> {
        self.by_type.values().flatten().find(|r| r.id == id)
    }

    /// Ranked registrations of the given buckets.
    ///
    /// A single bucket is already in order; several are merged and re-sorted.
    pub fn ranked(&self, type_ids: &[String]) -> Vec<InstanceRegistration> {
        let mut buckets = type_ids
            .iter()
            .filter_map(|id| self.by_type.get(id))
            .filter(|bucket| !bucket.is_empty());

        let (first, rest): (Option<&Vec<InstanceRegistration>>, Vec<&Vec<InstanceRegistration>>) =
            (buckets.next(), buckets.collect());

        match first {
            None => Vec::new(),
            Some(bucket) if rest.is_empty() => bucket.clone(),
            Some(bucket) => {
                let mut merged: Vec<_> = bucket
                    .iter()
                    .chain(rest.into_iter().flatten())
                    .cloned()
                    .collect();
                merged.sort_by(InstanceRegistration::rank_cmp);
                merged
            }
        }
    }

    /// Total number of registrations
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(regs: &[InstanceRegistration]) -> Vec<&str> {
        regs.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_bucket_order_ranking_then_declaration() {
        let mut index = InstanceIndex::default();
        index.register("a", "t", 0.0);
        index.register("b", "t", 5.0);
        index.register("c", "t", 5.0);
        index.register("d", "t", -1.0);

        assert_eq!(ids(&index.ranked(&["t".into()])), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_merged_buckets_resorted() {
        let mut index = InstanceIndex::default();
        index.register("a", "t", 1.0);
        index.register("b", "sub", 3.0);
        index.register("c", "t", 3.0);

        let ranked = index.ranked(&["t".into(), "sub".into()]);
        assert_eq!(ids(&ranked), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut index = InstanceIndex::default();
        index.register("a", "t", 1.0);
        index.register("a", "u", 2.0);

        assert_eq!(index.len(), 1);
        assert_eq!(index.find("a").map(|r| r.type_id.as_str()), Some("u"));
        assert_eq!(index.type_ids(), vec!["u".to_string()]);
    }
}
