//! Reviewer selection.
//!
//! The store supplies the eligible candidates (active, same team, not
//! excluded) in ascending user-ID order; a [`SelectionPolicy`] then decides
//! which of them to take.

use crate::error::AppError;
use crate::store::Store;
use rand::seq::SliceRandom;
use rand::Rng;

/// Reviewers assigned when a pull request is created.
pub const CREATION_REVIEWER_LIMIT: usize = 2;

/// How candidates are picked from the eligible list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// First `limit` candidates by user ID.
    LowestIdFirst,
    /// Uniformly random `limit` candidates.
    Random,
}

/// Pick up to `limit` candidates according to `policy`.
pub fn pick<R: Rng + ?Sized>(
    candidates: &[String],
    limit: usize,
    policy: SelectionPolicy,
    rng: &mut R,
) -> Vec<String> {
    match policy {
        SelectionPolicy::LowestIdFirst => candidates.iter().take(limit).cloned().collect(),
        SelectionPolicy::Random => candidates.choose_multiple(rng, limit).cloned().collect(),
    }
}

/// Select up to `limit` reviewers from `team_name`, skipping `exclude`.
///
/// Returning fewer than `limit` (or none) is not an error.
pub async fn select_reviewers<S: Store>(
    store: &S,
    scope: &mut S::Scope,
    team_name: &str,
    exclude: &[String],
    limit: usize,
    policy: SelectionPolicy,
) -> Result<Vec<String>, AppError> {
    let candidates = store
        .list_eligible_reviewers(Some(scope), team_name, exclude)
        .await?;

    let selected = pick_with_thread_rng(&candidates, limit, policy);

    log::debug!(
        "[selection] team={} policy={:?} candidates={} selected={:?}",
        team_name,
        policy,
        candidates.len(),
        selected
    );

    Ok(selected)
}

fn pick_with_thread_rng(candidates: &[String], limit: usize, policy: SelectionPolicy) -> Vec<String> {
    pick(candidates, limit, policy, &mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lowest_id_first_takes_prefix() {
        let mut rng = StdRng::seed_from_u64(7);
        let picked = pick(&ids(&["u1", "u2", "u3"]), 2, SelectionPolicy::LowestIdFirst, &mut rng);
        assert_eq!(picked, vec!["u1", "u2"]);
    }

    #[test]
    fn test_limit_larger_than_candidates() {
        let mut rng = StdRng::seed_from_u64(7);
        for policy in [SelectionPolicy::LowestIdFirst, SelectionPolicy::Random] {
            assert_eq!(pick(&ids(&["u1"]), 2, policy, &mut rng), vec!["u1"]);
            assert!(pick(&[], 2, policy, &mut rng).is_empty());
        }
    }

    #[test]
    fn test_random_picks_distinct_candidates() {
        let candidates = ids(&["u1", "u2", "u3", "u4", "u5"]);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let picked = pick(&candidates, 2, SelectionPolicy::Random, &mut rng);
            assert_eq!(picked.len(), 2);
            let unique: HashSet<&String> = picked.iter().collect();
            assert_eq!(unique.len(), 2);
            assert!(picked.iter().all(|p| candidates.contains(p)));
        }
    }

    #[test]
    fn test_random_reaches_every_candidate() {
        let candidates = ids(&["u1", "u2", "u3"]);
        let mut rng = StdRng::seed_from_u64(1);

        let seen: HashSet<String> = (0..200)
            .flat_map(|_| pick(&candidates, 1, SelectionPolicy::Random, &mut rng))
            .collect();
        assert_eq!(seen.len(), candidates.len());
    }
}
