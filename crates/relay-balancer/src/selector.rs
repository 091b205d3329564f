use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::exclusion::ExclusionCache;

/// Random candidate ordering with live exclusion filtering.
///
/// Every request gets its own uniformly random permutation of the pool.
/// Exclusions are checked when a candidate is reached, not when the
/// permutation is built, so the traversal reflects the cache as it is at the
/// moment each endpoint would be tried.
///
/// A traversal yields each distinct endpoint at most once, even when the pool
/// lists it twice and its exclusion has already been evicted from the
/// bounded cache.
pub struct CandidateSelector {
    exclusions: Arc<ExclusionCache>,
}

impl CandidateSelector {
    pub fn new(exclusions: Arc<ExclusionCache>) -> Self {
        Self { exclusions }
    }

    /// Shuffled copy of `pool`. The pool itself is left untouched.
    pub fn order(pool: &[String]) -> Vec<String> {
        Self::order_with(pool, &mut rand::thread_rng())
    }

    /// Shuffled copy of `pool` drawn from `rng`.
    pub fn order_with<R: Rng + ?Sized>(pool: &[String], rng: &mut R) -> Vec<String> {
        let mut shuffled = pool.to_vec();
        shuffled.shuffle(rng);
        shuffled
    }

    /// Lazily filtered traversal of a fresh random order of `pool`.
    pub fn candidates(&self, pool: &[String]) -> Candidates<'_> {
        Candidates {
            order: Self::order(pool).into_iter(),
            exclusions: &self.exclusions,
            tried: HashSet::with_capacity(pool.len()),
        }
    }
}

/// Iterator returned by [`CandidateSelector::candidates`].
pub struct Candidates<'a> {
    order: std::vec::IntoIter<String>,
    exclusions: &'a ExclusionCache,
    /// Endpoints already handed out by this traversal
    tried: HashSet<String>,
}

impl Iterator for Candidates<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let endpoint = self.order.next()?;
            if self.tried.contains(&endpoint) {
                continue;
            }
            if self.exclusions.is_excluded(&endpoint) {
                debug!("Skipping excluded endpoint {}", endpoint);
                continue;
            }
            self.tried.insert(endpoint.clone());
            return Some(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::time::Duration;

    fn pool(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://node{}", i)).collect()
    }

    fn selector() -> (CandidateSelector, Arc<ExclusionCache>) {
        let cache = Arc::new(ExclusionCache::new(10, Duration::from_secs(60)));
        (CandidateSelector::new(cache.clone()), cache)
    }

    #[test]
    fn test_order_is_a_permutation() {
        let nodes = pool(8);
        let mut ordered = CandidateSelector::order(&nodes);
        assert_eq!(ordered.len(), nodes.len());
        ordered.sort();
        let mut expected = nodes.clone();
        expected.sort();
        assert_eq!(ordered, expected);
    }

    #[test]
    fn test_order_does_not_mutate_pool() {
        let nodes = pool(5);
        let before = nodes.clone();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            CandidateSelector::order_with(&nodes, &mut rng);
        }
        assert_eq!(nodes, before);
    }

    #[test]
    fn test_order_keeps_duplicates() {
        let nodes = vec!["http://a".to_string(), "http://a".to_string()];
        assert_eq!(CandidateSelector::order(&nodes), nodes);
    }

    #[test]
    fn test_every_position_is_reached() {
        // Each endpoint should lead the order at least once over many draws
        let nodes = pool(4);
        let mut rng = StdRng::seed_from_u64(42);
        let firsts: HashSet<String> = (0..200)
            .map(|_| CandidateSelector::order_with(&nodes, &mut rng)[0].clone())
            .collect();
        assert_eq!(firsts.len(), nodes.len());
    }

    #[test]
    fn test_empty_pool() {
        let (selector, _) = selector();
        assert_eq!(selector.candidates(&[]).count(), 0);
    }

    #[tokio::test]
    async fn test_candidates_skip_excluded() {
        let (selector, cache) = selector();
        let nodes = pool(3);
        cache.exclude("http://node1");

        let candidates: Vec<String> = selector.candidates(&nodes).collect();
        assert_eq!(candidates.len(), 2);
        assert!(!candidates.contains(&"http://node1".to_string()));
    }

    #[tokio::test]
    async fn test_exclusion_is_checked_during_traversal() {
        let (selector, cache) = selector();
        let nodes = pool(3);

        let mut candidates = selector.candidates(&nodes);
        let first = candidates.next().unwrap();

        // Exclude everything else after traversal has started
        for node in &nodes {
            if *node != first {
                cache.exclude(node);
            }
        }
        assert_eq!(candidates.next(), None);
    }

    #[tokio::test]
    async fn test_duplicate_yielded_once() {
        let (selector, _) = selector();
        let nodes = vec![
            "http://a".to_string(),
            "http://b".to_string(),
            "http://a".to_string(),
        ];

        let mut candidates: Vec<String> = selector.candidates(&nodes).collect();
        candidates.sort();
        assert_eq!(candidates, vec!["http://a".to_string(), "http://b".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_yielded_once_after_exclusion_is_evicted() {
        // A one-slot cache forgets each exclusion as soon as the next one lands
        let cache = Arc::new(ExclusionCache::new(1, Duration::from_secs(60)));
        let selector = CandidateSelector::new(cache.clone());
        let mut nodes = pool(12);
        nodes.push("http://node0".to_string());

        let mut yielded = Vec::new();
        for endpoint in selector.candidates(&nodes) {
            cache.exclude(&endpoint);
            yielded.push(endpoint);
        }

        assert_eq!(yielded.len(), 12);
        assert_eq!(yielded.iter().filter(|e| *e == "http://node0").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_exclusion_is_selectable_again() {
        let cache = Arc::new(ExclusionCache::new(10, Duration::from_secs(1)));
        let selector = CandidateSelector::new(cache.clone());
        let nodes = vec!["http://a".to_string()];

        cache.exclude("http://a");
        assert_eq!(selector.candidates(&nodes).count(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(selector.candidates(&nodes).collect::<Vec<_>>(), nodes);
    }
}
