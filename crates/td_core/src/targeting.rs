//! Target ranking for turrets.
//!
//! Both acquisition strategies (radius scan and zone feed) hand the same
//! kind of candidate snapshot to [`TargetList::refresh`], so the final
//! ranked order depends only on the candidates and the policy, never on
//! how they were found.
//!
//! Ties are broken by ascending entity id so ranking is fully
//! deterministic.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::Fixed;

/// How a turret orders its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetingPolicy {
    /// Closest candidate first.
    #[default]
    Nearest,
    /// Uniformly shuffled; reshuffled whenever the candidate set or the
    /// policy changes.
    Random,
    /// Lowest current health first; unreadable health sorts last.
    LowestHealth,
}

/// How a turret discovers candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetAcquisition {
    /// Query every targetable unit within range each tick.
    #[default]
    RadiusScan,
    /// Maintain membership from trigger-zone enter/exit notifications.
    ZoneFeed,
}

/// What the ranker needs to know about one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateInfo {
    /// Candidate unit.
    pub id: EntityId,
    /// Squared distance from the turret.
    pub distance_sq: Fixed,
    /// Current health, if readable.
    pub health: Option<i32>,
}

fn by_distance(a: &CandidateInfo, b: &CandidateInfo) -> Ordering {
    a.distance_sq
        .cmp(&b.distance_sq)
        .then_with(|| a.id.cmp(&b.id))
}

fn by_health(a: &CandidateInfo, b: &CandidateInfo) -> Ordering {
    match (a.health, b.health) {
        (Some(ha), Some(hb)) => ha.cmp(&hb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Ranked, deduplicated list of a turret's current targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TargetList {
    ranked: Vec<EntityId>,
    /// Policy behind the current order.
    #[serde(default)]
    ranked_by: Option<TargetingPolicy>,
}

impl TargetList {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ranked: Vec::new(),
            ranked_by: None,
        }
    }

    /// Ranked ids, best first.
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.ranked
    }

    /// Best-ranked candidate.
    #[must_use]
    pub fn first(&self) -> Option<EntityId> {
        self.ranked.first().copied()
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Whether there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Whether `id` is currently a candidate.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.ranked.contains(&id)
    }

    /// Copy of the top `n` candidates, taken at the moment of firing.
    #[must_use]
    pub fn snapshot(&self, n: usize) -> Vec<EntityId> {
        self.ranked.iter().take(n).copied().collect()
    }

    /// Drop a candidate without re-ranking the rest.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let before = self.ranked.len();
        self.ranked.retain(|&c| c != id);
        self.ranked.len() != before
    }

    /// Clear every candidate.
    pub fn clear(&mut self) {
        self.ranked.clear();
    }

    /// Replace the list with a ranking of `candidates`.
    ///
    /// `candidates` must already be purged of stale references and free of
    /// duplicates. Returns `true` if the candidate *set* changed.
    pub fn refresh<R: Rng + ?Sized>(
        &mut self,
        mut candidates: Vec<CandidateInfo>,
        policy: TargetingPolicy,
        rng: &mut R,
    ) -> bool {
        let mut previous: Vec<EntityId> = self.ranked.clone();
        previous.sort_unstable();
        let mut current: Vec<EntityId> = candidates.iter().map(|c| c.id).collect();
        current.sort_unstable();
        current.dedup();
        let changed = previous != current;

        match policy {
            TargetingPolicy::Nearest => {
                candidates.sort_by(by_distance);
                self.ranked = candidates.iter().map(|c| c.id).collect();
            }
            TargetingPolicy::LowestHealth => {
                candidates.sort_by(by_health);
                self.ranked = candidates.iter().map(|c| c.id).collect();
            }
            TargetingPolicy::Random => {
                if changed || self.ranked_by != Some(policy) {
                    current.shuffle(rng);
                    self.ranked = current;
                }
            }
        }
        self.ranked.dedup();
        self.ranked_by = Some(policy);
        changed
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn info(id: EntityId, distance: i32, health: Option<i32>) -> CandidateInfo {
        CandidateInfo {
            id,
            distance_sq: Fixed::from_num(distance * distance),
            health,
        }
    }

    #[test]
    fn test_nearest_ranks_minimum_distance_first() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut list = TargetList::new();
        list.refresh(
            vec![info(1, 9, Some(10)), info(2, 3, Some(50)), info(3, 6, Some(5))],
            TargetingPolicy::Nearest,
            &mut rng,
        );
        assert_eq!(list.ids(), &[2, 3, 1]);
    }

    #[test]
    fn test_nearest_ties_break_by_id() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut list = TargetList::new();
        list.refresh(
            vec![info(8, 4, None), info(5, 4, None)],
            TargetingPolicy::Nearest,
            &mut rng,
        );
        assert_eq!(list.ids(), &[5, 8]);
    }

    #[test]
    fn test_lowest_health_puts_unreadable_last() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut list = TargetList::new();
        list.refresh(
            vec![info(1, 1, None), info(2, 1, Some(80)), info(3, 1, Some(20))],
            TargetingPolicy::LowestHealth,
            &mut rng,
        );
        assert_eq!(list.ids(), &[3, 2, 1]);
    }

    #[test]
    fn test_random_keeps_order_while_set_unchanged() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut list = TargetList::new();
        let set = || (1..=8).map(|id| info(id, id as i32, None)).collect::<Vec<_>>();

        assert!(list.refresh(set(), TargetingPolicy::Random, &mut rng));
        let first_order = list.ids().to_vec();

        assert!(!list.refresh(set(), TargetingPolicy::Random, &mut rng));
        assert_eq!(list.ids(), first_order.as_slice());
    }

    #[test]
    fn test_switch_to_random_reshuffles_same_set() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut list = TargetList::new();
        let set = || (1..=8).map(|id| info(id, id as i32, None)).collect::<Vec<_>>();

        list.refresh(set(), TargetingPolicy::Nearest, &mut rng);
        assert_eq!(list.ids(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        assert!(!list.refresh(set(), TargetingPolicy::Random, &mut rng));
        let mut expected: Vec<EntityId> = (1..=8).collect();
        expected.shuffle(&mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(list.ids(), expected.as_slice());

        let shuffled = list.ids().to_vec();
        assert!(!list.refresh(set(), TargetingPolicy::Random, &mut rng));
        assert_eq!(list.ids(), shuffled.as_slice());
    }

    #[test]
    fn test_random_reshuffles_on_change_and_keeps_members() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut list = TargetList::new();
        list.refresh(
            (1..=5).map(|id| info(id, 1, None)).collect(),
            TargetingPolicy::Random,
            &mut rng,
        );
        assert!(list.refresh(
            (1..=6).map(|id| info(id, 1, None)).collect(),
            TargetingPolicy::Random,
            &mut rng,
        ));
        let mut members = list.ids().to_vec();
        members.sort_unstable();
        assert_eq!(members, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_random_is_seed_deterministic() {
        let order = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut list = TargetList::new();
            list.refresh(
                (1..=10).map(|id| info(id, 1, None)).collect(),
                TargetingPolicy::Random,
                &mut rng,
            );
            list.ids().to_vec()
        };
        assert_eq!(order(42), order(42));
    }

    #[test]
    fn test_removing_top_promotes_next() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut list = TargetList::new();
        list.refresh(
            vec![info(1, 2, None), info(2, 4, None), info(3, 6, None)],
            TargetingPolicy::Nearest,
            &mut rng,
        );
        list.refresh(
            vec![info(2, 4, None), info(3, 6, None)],
            TargetingPolicy::Nearest,
            &mut rng,
        );
        assert_eq!(list.first(), Some(2));
    }

    #[test]
    fn test_snapshot_is_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut list = TargetList::new();
        list.refresh(
            (1..=5).map(|id| info(id, id as i32, None)).collect(),
            TargetingPolicy::Nearest,
            &mut rng,
        );
        assert_eq!(list.snapshot(3), vec![1, 2, 3]);
        assert_eq!(list.snapshot(10).len(), 5);
    }
}
