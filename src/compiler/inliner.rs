//! The cross-method inliner cache service and profile lookup interface.
//!
//! Inlining merges independently built graphs into one container
//! ([`crate::mir::MirGraph::merge`]); the decision of *what* to merge is
//! biased by offline profile data looked up through [`ProfileSource`].
//! The lookup results are cached per dex file in an explicit service
//! object passed by reference into each compilation - never ambient or
//! global state. The cache map is a concurrent create-on-first-use map,
//! safe to share across the parallel batch driver's worker threads.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Hotness counts of one dex file's methods, keyed by
/// `(class_def_index, method_index)`.
pub type MethodHotness = HashMap<(u16, u16), u32>;

/// An offline profile store queried by identifier.
///
/// Implementations wrap whatever profile format the embedder uses; this
/// crate only consumes the counts.
pub trait ProfileSource: Send + Sync {
    /// Hotness count of a method, or `None` when never sampled.
    fn hotness(&self, class_def_index: u16, method_index: u16) -> Option<u32>;
}

/// A profile source with no data; every lookup misses.
#[derive(Debug, Default)]
pub struct EmptyProfile;

impl ProfileSource for EmptyProfile {
    fn hotness(&self, _class_def_index: u16, _method_index: u16) -> Option<u32> {
        None
    }
}

/// The shared inliner-info cache, keyed by dex file id.
///
/// Create-on-first-use: the first compilation touching a dex file
/// populates its hotness table from the profile source; later
/// compilations (possibly on other worker threads) reuse it.
pub struct InlinerCache {
    tables: DashMap<u32, Arc<MethodHotness>>,
    /// Calls at least this hot are candidates for merge-based inlining.
    hot_threshold: u32,
}

impl InlinerCache {
    /// Creates an empty cache with the default hotness threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            hot_threshold: 1000,
        }
    }

    /// Creates a cache with a custom hotness threshold.
    #[must_use]
    pub fn with_threshold(hot_threshold: u32) -> Self {
        Self {
            tables: DashMap::new(),
            hot_threshold,
        }
    }

    /// Number of dex files with cached tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` when no table has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The hotness table of a dex file, populating it from `profile` on
    /// first use.
    pub fn table_for(
        &self,
        dex_file_id: u32,
        profile: &dyn ProfileSource,
        methods: &[(u16, u16)],
    ) -> Arc<MethodHotness> {
        self.tables
            .entry(dex_file_id)
            .or_insert_with(|| {
                let mut table = MethodHotness::new();
                for &(class_def_index, method_index) in methods {
                    if let Some(count) = profile.hotness(class_def_index, method_index) {
                        table.insert((class_def_index, method_index), count);
                    }
                }
                Arc::new(table)
            })
            .clone()
    }

    /// Whether a call site is hot enough to justify merging the callee.
    #[must_use]
    pub fn should_inline(
        &self,
        dex_file_id: u32,
        class_def_index: u16,
        method_index: u16,
    ) -> bool {
        self.tables
            .get(&dex_file_id)
            .and_then(|table| table.get(&(class_def_index, method_index)).copied())
            .is_some_and(|count| count >= self.hot_threshold)
    }
}

impl Default for InlinerCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProfile;

    impl ProfileSource for FixedProfile {
        fn hotness(&self, class_def_index: u16, method_index: u16) -> Option<u32> {
            (class_def_index == 1 && method_index == 2).then_some(5000)
        }
    }

    #[test]
    fn test_create_on_first_use() {
        let cache = InlinerCache::new();
        assert!(cache.is_empty());

        let methods = [(1u16, 2u16), (1, 3)];
        let table = cache.table_for(7, &FixedProfile, &methods);
        assert_eq!(table.get(&(1, 2)), Some(&5000));
        assert_eq!(table.get(&(1, 3)), None);
        assert_eq!(cache.len(), 1);

        // Second lookup reuses the cached table.
        let again = cache.table_for(7, &FixedProfile, &[]);
        assert_eq!(again.get(&(1, 2)), Some(&5000));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_should_inline_threshold() {
        let cache = InlinerCache::with_threshold(4000);
        cache.table_for(7, &FixedProfile, &[(1, 2)]);

        assert!(cache.should_inline(7, 1, 2));
        assert!(!cache.should_inline(7, 1, 3));
        assert!(!cache.should_inline(8, 1, 2));
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = std::sync::Arc::new(InlinerCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache.table_for(1, &FixedProfile, &[(1, 2)]);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }
}
