//! Owner selection and load balancing shared by every wheel-based factory.
//!
//! # Algorithm
//!
//! 1. **Targets**: each member's expected share of all owner slots is
//!    proportional to its capacity factor (capped at one slot per segment);
//!    its expected primary share is proportional to the same weight.
//! 2. **Fill**: segments with fewer than `k` owners get new owners, best
//!    placement rank first, then largest remaining share, then wheel order.
//! 3. **Diversify**: an owner sharing its exact failure domain with another
//!    owner of the same segment is replaced when some member would rank
//!    better in its place.
//! 4. **Balance**: an owner slot moves from a member above its band to a
//!    member below it, never lowering placement rank and never adding an
//!    owner that shares its exact domain with more co-owners than the one it
//!    replaces. Members inside `[floor(target), ceil(target)]` keep every
//!    segment they own.
//! 5. **Primaries**: the same band rule, applied by reordering the owners a
//!    segment already has. No data moves.
//!
//! Every phase visits segments in index order and candidates in wheel order.
//! Phases 3 to 5 repeat as a round until a whole round changes nothing, so
//! the result is a deterministic fixed point: running it again changes
//! nothing.
//!
//! The rounds terminate because every change strictly lowers, in
//! lexicographic order, the number of same-domain owner pairs, the squared
//! deviation of owned counts from their targets, and the squared deviation
//! of primary counts. Diversify lowers the first; balance keeps the first and
//! lowers the second; primary swaps keep both and lower the third.

use std::cmp::Ordering;

use corelib::{Address, TopologyLevel, Wheel};

use crate::placement::PlacementPolicy;

const EPSILON: f64 = 1e-9;

/// Expected owned and primary-owned segment counts per member.
#[derive(Clone, Debug, PartialEq)]
pub struct Targets {
    pub owned: Vec<f64>,
    pub primary: Vec<f64>,
}

impl Targets {
    /// Split `num_segments * k` owner slots and `num_segments` primaries by
    /// weight. No member is expected to own more than `num_segments`.
    pub fn compute(weights: &[f64], num_segments: usize, k: usize) -> Self {
        let total_weight: f64 = weights.iter().sum();
        let primary = weights
            .iter()
            .map(|w| num_segments as f64 * w / total_weight)
            .collect();

        let cap = num_segments as f64;
        let mut owned = vec![0.0; weights.len()];
        let mut capped = vec![false; weights.len()];
        let mut remaining = (num_segments * k) as f64;
        loop {
            let free_weight: f64 = weights
                .iter()
                .zip(&capped)
                .filter(|(_, c)| !**c)
                .map(|(w, _)| w)
                .sum();
            if free_weight <= 0.0 {
                break;
            }
            let share = remaining / free_weight;
            for i in 0..weights.len() {
                if !capped[i] {
                    owned[i] = share * weights[i];
                }
            }
            let mut newly_capped = false;
            for i in 0..weights.len() {
                if !capped[i] && owned[i] > cap + EPSILON {
                    owned[i] = cap;
                    capped[i] = true;
                    remaining -= cap;
                    newly_capped = true;
                }
            }
            if !newly_capped {
                break;
            }
        }

        Self { owned, primary }
    }
}

#[inline]
fn floor(target: f64) -> usize {
    (target + EPSILON).floor() as usize
}

#[inline]
fn ceil(target: f64) -> usize {
    (target - EPSILON).ceil().max(0.0) as usize
}

/// Whether one slot may move from a member holding `from` (target
/// `from_target`) to a member holding `to` (target `to_target`).
fn may_move(from: usize, from_target: f64, to: usize, to_target: f64) -> bool {
    (from > ceil(from_target) && to < ceil(to_target))
        || (from > floor(from_target) && to < floor(to_target))
}

/// Candidate comparison key: placement rank, then remaining share.
#[derive(Clone, Copy, Debug)]
struct Preference {
    rank: TopologyLevel,
    deficit: f64,
}

impl Preference {
    fn beats(&self, other: &Preference) -> bool {
        match self.rank.cmp(&other.rank) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.deficit > other.deficit + EPSILON,
        }
    }
}

/// Owners of one segment by pure wheel walk: for each slot, the earliest
/// clockwise candidate with the best placement rank.
pub fn wheel_owners(
    wheel: &Wheel,
    policy: &dyn PlacementPolicy,
    members: &[Address],
    segment: usize,
    k: usize,
) -> Vec<usize> {
    let order: Vec<usize> = wheel.candidates(segment).collect();
    let mut owners: Vec<usize> = Vec::with_capacity(k);
    while owners.len() < k {
        let chosen: Vec<&Address> = owners.iter().map(|&o| &members[o]).collect();
        let mut best: Option<(usize, TopologyLevel)> = None;
        for &candidate in &order {
            if owners.contains(&candidate) {
                continue;
            }
            let rank = policy.rank(&chosen, &members[candidate]);
            if best.map_or(true, |(_, r)| rank > r) {
                best = Some((candidate, rank));
            }
        }
        match best {
            Some((candidate, _)) => owners.push(candidate),
            None => break,
        }
    }
    owners
}

/// Counts of changes made by a [`Rebalancer`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebalanceSummary {
    /// Owner slots added to under-replicated segments.
    pub filled: usize,
    /// Owner slots reassigned to restore failure-domain diversity.
    pub diversified: usize,
    /// Owner slots moved from an overloaded member to an underloaded one.
    pub moved: usize,
    /// Segments whose primary owner changed by reordering.
    pub primaries_swapped: usize,
}

/// Mutable working copy of a segment → owners table.
pub struct Rebalancer<'a> {
    members: &'a [Address],
    wheel: &'a Wheel,
    policy: &'a dyn PlacementPolicy,
    k: usize,
    targets: Targets,
    owners: Vec<Vec<usize>>,
    owned: Vec<usize>,
    primary: Vec<usize>,
}

impl<'a> Rebalancer<'a> {
    /// `owned` and `primary` are the current counts per member, aligned with
    /// `members`, matching `owners`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        members: &'a [Address],
        wheel: &'a Wheel,
        policy: &'a dyn PlacementPolicy,
        k: usize,
        targets: Targets,
        owners: Vec<Vec<usize>>,
        owned: Vec<usize>,
        primary: Vec<usize>,
    ) -> Self {
        Self {
            members,
            wheel,
            policy,
            k,
            targets,
            owners,
            owned,
            primary,
        }
    }

    /// Fill, then repeat the diversify / balance / primaries round until it
    /// changes nothing.
    pub fn run(mut self) -> (Vec<Vec<usize>>, RebalanceSummary) {
        let mut summary = RebalanceSummary {
            filled: self.fill(),
            ..RebalanceSummary::default()
        };
        loop {
            let diversified = self.diversify();
            let moved = self.balance_owners();
            let primaries_swapped = self.balance_primaries();
            summary.diversified += diversified;
            summary.moved += moved;
            summary.primaries_swapped += primaries_swapped;
            if diversified + moved + primaries_swapped == 0 {
                return (self.owners, summary);
            }
        }
    }

    fn deficit(&self, member: usize) -> f64 {
        self.targets.owned[member] - self.owned[member] as f64
    }

    fn rank_against(&self, segment: usize, skip: Option<usize>, candidate: usize) -> TopologyLevel {
        let chosen: Vec<&Address> = self.owners[segment]
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != skip)
            .map(|(_, &o)| &self.members[o])
            .collect();
        self.policy.rank(&chosen, &self.members[candidate])
    }

    /// Other owners of `segment` that `candidate` shares an exact domain with.
    fn collisions(&self, segment: usize, skip: Option<usize>, candidate: usize) -> usize {
        self.owners[segment]
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != skip)
            .filter(|(_, &o)| {
                self.policy.rank(&[&self.members[o]], &self.members[candidate])
                    == TopologyLevel::Same
            })
            .count()
    }

    fn fill(&mut self) -> usize {
        let mut filled = 0;
        for segment in 0..self.owners.len() {
            if self.owners[segment].len() >= self.k {
                continue;
            }
            let order: Vec<usize> = self.wheel.candidates(segment).collect();
            while self.owners[segment].len() < self.k {
                let mut best: Option<(usize, Preference)> = None;
                for &candidate in &order {
                    if self.owners[segment].contains(&candidate) {
                        continue;
                    }
                    let preference = Preference {
                        rank: self.rank_against(segment, None, candidate),
                        deficit: self.deficit(candidate),
                    };
                    if best.map_or(true, |(_, b)| preference.beats(&b)) {
                        best = Some((candidate, preference));
                    }
                }
                let Some((candidate, _)) = best else { break };
                if self.owners[segment].is_empty() {
                    self.primary[candidate] += 1;
                }
                self.owners[segment].push(candidate);
                self.owned[candidate] += 1;
                filled += 1;
            }
        }
        filled
    }

    /// Best non-owner for `owners[segment][position]` by rank then deficit.
    fn best_replacement(&self, segment: usize, position: usize) -> Option<(usize, TopologyLevel)> {
        let mut best: Option<(usize, Preference)> = None;
        for candidate in self.wheel.candidates(segment) {
            if self.owners[segment].contains(&candidate) {
                continue;
            }
            let preference = Preference {
                rank: self.rank_against(segment, Some(position), candidate),
                deficit: self.deficit(candidate),
            };
            if best.map_or(true, |(_, b)| preference.beats(&b)) {
                best = Some((candidate, preference));
            }
        }
        best.map(|(candidate, preference)| (candidate, preference.rank))
    }

    fn diversify(&mut self) -> usize {
        let mut replaced = 0;
        loop {
            let mut changed = false;
            for segment in 0..self.owners.len() {
                if self.owners[segment].len() < 2 {
                    continue;
                }
                for position in (0..self.owners[segment].len()).rev() {
                    let from = self.owners[segment][position];
                    if self.rank_against(segment, Some(position), from) > TopologyLevel::Same {
                        continue;
                    }
                    let Some((to, rank)) = self.best_replacement(segment, position) else {
                        continue;
                    };
                    if rank == TopologyLevel::Same {
                        continue;
                    }
                    self.owners[segment][position] = to;
                    self.owned[from] -= 1;
                    self.owned[to] += 1;
                    if position == 0 {
                        self.primary[from] -= 1;
                        self.primary[to] += 1;
                    }
                    replaced += 1;
                    changed = true;
                }
            }
            if !changed {
                return replaced;
            }
        }
    }

    fn balance_owners(&mut self) -> usize {
        let mut moved = 0;
        loop {
            let mut changed = false;
            for segment in 0..self.owners.len() {
                // Backups first, so primaries move only when nothing else can.
                for position in (0..self.owners[segment].len()).rev() {
                    let from = self.owners[segment][position];
                    if self.owned[from] <= floor(self.targets.owned[from]) {
                        continue;
                    }
                    if let Some(to) = self.receiver(segment, position) {
                        self.owners[segment][position] = to;
                        self.owned[from] -= 1;
                        self.owned[to] += 1;
                        if position == 0 {
                            self.primary[from] -= 1;
                            self.primary[to] += 1;
                        }
                        moved += 1;
                        changed = true;
                    }
                }
            }
            if !changed {
                return moved;
            }
        }
    }

    /// Best member to take over `owners[segment][position]`, if any may.
    fn receiver(&self, segment: usize, position: usize) -> Option<usize> {
        let from = self.owners[segment][position];
        let from_rank = self.rank_against(segment, Some(position), from);
        let from_collisions = self.collisions(segment, Some(position), from);

        let mut best: Option<(usize, Preference)> = None;
        for candidate in self.wheel.candidates(segment) {
            if self.owners[segment].contains(&candidate)
                || !may_move(
                    self.owned[from],
                    self.targets.owned[from],
                    self.owned[candidate],
                    self.targets.owned[candidate],
                )
            {
                continue;
            }
            let rank = self.rank_against(segment, Some(position), candidate);
            if rank < from_rank
                || self.collisions(segment, Some(position), candidate) > from_collisions
            {
                continue;
            }
            let preference = Preference {
                rank,
                deficit: self.deficit(candidate),
            };
            if best.map_or(true, |(_, b)| preference.beats(&b)) {
                best = Some((candidate, preference));
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    fn balance_primaries(&mut self) -> usize {
        let mut swapped = 0;
        loop {
            let mut changed = false;
            for segment in 0..self.owners.len() {
                let owners = &self.owners[segment];
                if owners.len() < 2 {
                    continue;
                }
                let current = owners[0];
                if self.primary[current] <= floor(self.targets.primary[current]) {
                    continue;
                }

                let mut best: Option<(usize, f64)> = None;
                for (position, &candidate) in owners.iter().enumerate().skip(1) {
                    if !may_move(
                        self.primary[current],
                        self.targets.primary[current],
                        self.primary[candidate],
                        self.targets.primary[candidate],
                    ) {
                        continue;
                    }
                    let deficit = self.targets.primary[candidate] - self.primary[candidate] as f64;
                    if best.map_or(true, |(_, d)| deficit > d + EPSILON) {
                        best = Some((position, deficit));
                    }
                }

                if let Some((position, _)) = best {
                    let candidate = self.owners[segment][position];
                    self.owners[segment].swap(0, position);
                    self.primary[current] -= 1;
                    self.primary[candidate] += 1;
                    swapped += 1;
                    changed = true;
                }
            }
            if !changed {
                return swapped;
            }
        }
    }
}
