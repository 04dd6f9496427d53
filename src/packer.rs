use std::time::Instant;

use thiserror::Error;

use crate::types::{Bar, BarPiece, Len, PackUnit};

/// Ceilings on the best-combination search. The subset enumeration is
/// exponential in the worst case; when a ceiling is hit the bucket falls
/// back to greedy placement instead of risking unbounded latency.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Most units considered per combination pass (longest first).
    pub max_units: usize,
    /// Total search nodes allowed per pass.
    pub max_steps: u64,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_units: 48,
            max_steps: 2_000_000,
        }
    }
}

/// The two placement algorithms. `BestCombination` is the default and
/// degrades to `FirstFit` when a search ceiling or deadline is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaceAlgorithm {
    #[default]
    BestCombination,
    FirstFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PackError {
    #[error("unit of length {length} x {pieces} exceeds bar capacity {capacity}")]
    ExceedsCapacity {
        length: Len,
        pieces: u32,
        capacity: Len,
    },
    #[error("packing stalled with {remaining} units left")]
    Stalled { remaining: usize },
}

/// A unit that could not be placed; excluded from bars but reported so
/// the caller can reconcile piece counts.
#[derive(Debug, Clone)]
pub struct Unplaceable {
    pub unit: PackUnit,
    pub reason: PackError,
}

#[derive(Debug, Default)]
pub struct PackOutcome {
    pub bars: Vec<Bar>,
    pub unplaceable: Vec<Unplaceable>,
}

/// Packs one bucket's units into bars.
pub struct Packer {
    pub capacity: Len,
    pub algorithm: PlaceAlgorithm,
    /// Whether a unit's multiplicity may be consumed partially (flat
    /// splitting) or only as a whole (committed pairs).
    pub divisible: bool,
    pub limits: SearchLimits,
    /// Wall-clock cutoff; past it the current bucket finishes greedily.
    pub deadline: Option<Instant>,
}

impl Packer {
    pub fn new(capacity: Len, algorithm: PlaceAlgorithm, divisible: bool) -> Self {
        Self {
            capacity,
            algorithm,
            divisible,
            limits: SearchLimits::default(),
            deadline: None,
        }
    }

    /// Repeatedly fills one bar with the best remaining combination until
    /// the pool is empty. Units live in an index-addressable pool and are
    /// consumed by decrementing their remaining multiplicity, so removal
    /// never depends on value matching.
    pub fn pack(&self, units: Vec<PackUnit>) -> PackOutcome {
        let mut slots = units;
        let mut order: Vec<usize> = (0..slots.len()).collect();
        // Stable sort: equal lengths keep pool order.
        order.sort_by(|&a, &b| slots[b].length().cmp(&slots[a].length()));

        let mut out = PackOutcome::default();

        if self.algorithm == PlaceAlgorithm::FirstFit {
            self.first_fit(&mut slots, &order, &mut out, 0);
            return out;
        }

        loop {
            let candidates: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&i| slots[i].multiplicity > 0)
                .take(self.limits.max_units)
                .collect();
            if candidates.is_empty() {
                break;
            }
            let live_before = live_pieces(&slots);

            let search = self.best_combination(&slots, &candidates);
            if search.exhausted {
                tracing::debug!(
                    steps = self.limits.max_steps,
                    "combination search budget exhausted, finishing bucket greedily"
                );
                let from = out.bars.len();
                self.first_fit(&mut slots, &order, &mut out, from);
                break;
            }

            if search.picks.is_empty() {
                // Not even the longest remaining unit fits a fresh bar.
                self.place_single(&mut slots[candidates[0]], &mut out);
            } else {
                let mut bar = Bar::new(self.capacity);
                for &(i, count) in &search.picks {
                    bar.pieces.push(self.take_piece(&mut slots[i], count));
                }
                out.bars.push(bar);
            }

            if live_pieces(&slots) == live_before {
                // Invariant violation: a pass must consume demand.
                let remaining = order
                    .iter()
                    .filter(|&&i| slots[i].multiplicity > 0)
                    .count();
                tracing::warn!(remaining, "packing made no progress, aborting bucket");
                for &i in &order {
                    if slots[i].multiplicity > 0 {
                        out.unplaceable.push(Unplaceable {
                            unit: slots[i].clone(),
                            reason: PackError::Stalled { remaining },
                        });
                        slots[i].multiplicity = 0;
                    }
                }
                break;
            }
        }

        out
    }

    /// Consumes `count` pieces from a pool slot into a placed row. The
    /// output `Qty` marker is 1 for individually placed pieces and the
    /// pack size for committed pairs.
    fn take_piece(&self, slot: &mut PackUnit, count: u32) -> BarPiece {
        debug_assert!(count > 0 && count <= slot.multiplicity);
        slot.multiplicity -= count;
        BarPiece {
            attrs: slot.attrs.clone(),
            cutting_id: count,
            qty: if self.divisible { 1 } else { count },
        }
    }

    /// Fallback for a unit no combination can host: a bar of its own if
    /// it fits, otherwise an unplaceable record.
    fn place_single(&self, slot: &mut PackUnit, out: &mut PackOutcome) {
        let cap = self.capacity.hundredths() as u64;
        if slot.total_length() <= cap {
            let mut bar = Bar::new(self.capacity);
            let count = slot.multiplicity;
            bar.pieces.push(self.take_piece(slot, count));
            out.bars.push(bar);
        } else {
            out.unplaceable.push(Unplaceable {
                unit: slot.clone(),
                reason: PackError::ExceedsCapacity {
                    length: slot.length(),
                    pieces: slot.multiplicity,
                    capacity: self.capacity,
                },
            });
            slot.multiplicity = 0;
        }
    }

    /// First-fit-decreasing over the remaining pool. Only bars at index
    /// `from` onward are topped up, so bars already produced by the
    /// combination search stay final.
    fn first_fit(
        &self,
        slots: &mut [PackUnit],
        order: &[usize],
        out: &mut PackOutcome,
        from: usize,
    ) {
        let cap = self.capacity.hundredths() as u64;
        for &i in order {
            while slots[i].multiplicity > 0 {
                let len = slots[i].length().hundredths() as u64;
                let need = if self.divisible {
                    len
                } else {
                    slots[i].total_length()
                };

                let target = out.bars[from..]
                    .iter()
                    .position(|b| b.remaining() >= need)
                    .map(|p| p + from);

                match target {
                    Some(bi) => {
                        let count = if self.divisible {
                            (out.bars[bi].remaining() / len).min(slots[i].multiplicity as u64)
                                as u32
                        } else {
                            slots[i].multiplicity
                        };
                        let piece = self.take_piece(&mut slots[i], count);
                        out.bars[bi].pieces.push(piece);
                    }
                    None if need <= cap => {
                        let count = if self.divisible {
                            (cap / len).min(slots[i].multiplicity as u64) as u32
                        } else {
                            slots[i].multiplicity
                        };
                        let mut bar = Bar::new(self.capacity);
                        bar.pieces.push(self.take_piece(&mut slots[i], count));
                        out.bars.push(bar);
                    }
                    None => {
                        out.unplaceable.push(Unplaceable {
                            unit: slots[i].clone(),
                            reason: PackError::ExceedsCapacity {
                                length: slots[i].length(),
                                pieces: slots[i].multiplicity,
                                capacity: self.capacity,
                            },
                        });
                        slots[i].multiplicity = 0;
                    }
                }
            }
        }
    }

    /// Depth-first enumeration of forward-only subsets of the candidate
    /// window, tracking the subset with least waste, ties broken by most
    /// physical pieces. A branch is abandoned the moment the next pick
    /// would overflow the bar.
    fn best_combination(&self, slots: &[PackUnit], candidates: &[usize]) -> SearchResult {
        let mut search = SearchState {
            cap: self.capacity.hundredths() as u64,
            divisible: self.divisible,
            max_steps: self.limits.max_steps,
            deadline: self.deadline,
            steps: 0,
            exhausted: false,
            best: SearchResult::default(),
        };
        let mut cur = Vec::new();
        search.dfs(slots, candidates, 0, &mut cur, 0, 0);
        if search.exhausted {
            search.best.exhausted = true;
        }
        search.best
    }
}

#[derive(Debug, Default)]
struct SearchResult {
    picks: Vec<(usize, u32)>,
    total: u64,
    pieces: u64,
    exhausted: bool,
}

struct SearchState {
    cap: u64,
    divisible: bool,
    max_steps: u64,
    deadline: Option<Instant>,
    steps: u64,
    exhausted: bool,
    best: SearchResult,
}

impl SearchState {
    fn dfs(
        &mut self,
        slots: &[PackUnit],
        candidates: &[usize],
        start: usize,
        cur: &mut Vec<(usize, u32)>,
        total: u64,
        pieces: u64,
    ) {
        self.steps += 1;
        if self.steps > self.max_steps {
            self.exhausted = true;
            return;
        }
        if self.steps.is_multiple_of(1024)
            && let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.exhausted = true;
            return;
        }

        if total > self.best.total || (total == self.best.total && pieces > self.best.pieces) {
            self.best = SearchResult {
                picks: cur.clone(),
                total,
                pieces,
                exhausted: false,
            };
        }

        for idx in start..candidates.len() {
            let slot = &slots[candidates[idx]];
            let len = slot.length().hundredths() as u64;
            let room = self.cap - total;

            if self.divisible {
                let fit = (room / len).min(slot.multiplicity as u64) as u32;
                // Fewer pieces of a long unit can leave room for better
                // company, so every count is a separate branch.
                for count in (1..=fit).rev() {
                    cur.push((candidates[idx], count));
                    self.dfs(
                        slots,
                        candidates,
                        idx + 1,
                        cur,
                        total + len * count as u64,
                        pieces + count as u64,
                    );
                    cur.pop();
                    if self.exhausted {
                        return;
                    }
                }
            } else if slot.total_length() <= room {
                cur.push((candidates[idx], slot.multiplicity));
                self.dfs(
                    slots,
                    candidates,
                    idx + 1,
                    cur,
                    total + slot.total_length(),
                    pieces + slot.multiplicity as u64,
                );
                cur.pop();
                if self.exhausted {
                    return;
                }
            }
        }
    }
}

fn live_pieces(slots: &[PackUnit]) -> u64 {
    slots.iter().map(|s| s.multiplicity as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_BAR_LENGTH, LineAttrs};
    use std::sync::Arc;

    fn unit(length: f64, multiplicity: u32) -> PackUnit {
        PackUnit {
            attrs: Arc::new(LineAttrs {
                order_no: String::new(),
                kind: String::new(),
                material_code: "A".into(),
                material_position: String::new(),
                color: "Red".into(),
                width_height: String::new(),
                length: Len::from_units(length).unwrap(),
                angles: String::new(),
                window_number: String::new(),
                grid: String::new(),
                lock: String::new(),
                nailing_fin: String::new(),
            }),
            multiplicity,
        }
    }

    fn pair_packer() -> Packer {
        Packer::new(DEFAULT_BAR_LENGTH, PlaceAlgorithm::BestCombination, false)
    }

    fn flat_packer() -> Packer {
        Packer::new(DEFAULT_BAR_LENGTH, PlaceAlgorithm::BestCombination, true)
    }

    /// Every placed piece is accounted for, no bar is over-filled, and
    /// waste matches the capacity minus the placed total.
    fn assert_outcome_valid(out: &PackOutcome, expected_pieces: u64) {
        let placed: u64 = out
            .bars
            .iter()
            .flat_map(|b| &b.pieces)
            .map(|p| p.cutting_id as u64)
            .sum();
        let lost: u64 = out
            .unplaceable
            .iter()
            .map(|u| u.unit.multiplicity as u64)
            .sum();
        assert_eq!(placed + lost, expected_pieces);

        for (bi, bar) in out.bars.iter().enumerate() {
            assert!(
                bar.used() <= bar.capacity.hundredths() as u64,
                "bar {bi} over-filled: {} > {}",
                bar.used(),
                bar.capacity
            );
            assert_eq!(
                bar.waste().hundredths() as u64,
                bar.capacity.hundredths() as u64 - bar.used()
            );
        }
    }

    /// Spec'd scenario: one group of length 100, qty 5, committed pairs.
    /// Two pairs of 200 each need their own bar, the leftover single gets
    /// a third.
    #[test]
    fn test_pairs_of_100_need_three_bars() {
        let out = pair_packer().pack(vec![unit(100.0, 2), unit(100.0, 2), unit(100.0, 1)]);
        assert_outcome_valid(&out, 5);
        assert!(out.unplaceable.is_empty());
        assert_eq!(out.bars.len(), 3);
        let cutting: Vec<u32> = out
            .bars
            .iter()
            .flat_map(|b| &b.pieces)
            .map(|p| p.cutting_id)
            .collect();
        assert_eq!(cutting, vec![2, 2, 1]);
        assert_eq!(out.bars[0].waste(), Len::from_units(10.0).unwrap());
        assert_eq!(out.bars[1].waste(), Len::from_units(10.0).unwrap());
        assert_eq!(out.bars[2].waste(), Len::from_units(110.0).unwrap());
    }

    /// Spec'd scenario: lengths 70 (x2) and 140 (x1) under flat splitting.
    /// One 70 joins the 140 for a zero-waste bar; the other 70 stands
    /// alone.
    #[test]
    fn test_flat_70_140_zero_waste() {
        let out = flat_packer().pack(vec![unit(70.0, 2), unit(140.0, 1)]);
        assert_outcome_valid(&out, 3);
        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.bars[0].waste(), Len::ZERO);
        assert_eq!(out.bars[1].waste(), Len::from_units(140.0).unwrap());
        let first: Vec<(f64, u32)> = out.bars[0]
            .pieces
            .iter()
            .map(|p| (p.length().units(), p.cutting_id))
            .collect();
        assert_eq!(first, vec![(140.0, 1), (70.0, 1)]);
    }

    #[test]
    fn test_waste_tie_prefers_more_pieces() {
        // 105+105 and 70+70+70 both fill the bar exactly; three pieces win.
        let out = pair_packer().pack(vec![
            unit(105.0, 1),
            unit(105.0, 1),
            unit(70.0, 1),
            unit(70.0, 1),
            unit(70.0, 1),
        ]);
        assert_outcome_valid(&out, 5);
        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.bars[0].pieces.len(), 3);
        assert_eq!(out.bars[0].waste(), Len::ZERO);
        assert_eq!(out.bars[1].pieces.len(), 2);
    }

    #[test]
    fn test_single_piece_longer_than_bar_is_unplaceable() {
        let out = pair_packer().pack(vec![unit(250.0, 1), unit(100.0, 1)]);
        assert_outcome_valid(&out, 2);
        assert_eq!(out.bars.len(), 1);
        assert_eq!(out.unplaceable.len(), 1);
        assert!(matches!(
            out.unplaceable[0].reason,
            PackError::ExceedsCapacity { .. }
        ));
    }

    #[test]
    fn test_pair_too_long_to_keep_together_is_unplaceable() {
        // 2 x 150 = 300 > 210 and pairs never split.
        let out = pair_packer().pack(vec![unit(150.0, 2)]);
        assert_outcome_valid(&out, 2);
        assert!(out.bars.is_empty());
        assert_eq!(out.unplaceable.len(), 1);
    }

    #[test]
    fn test_flat_splits_long_run_across_bars() {
        // 5 pieces of 100: two per bar, one left over.
        let out = flat_packer().pack(vec![unit(100.0, 5)]);
        assert_outcome_valid(&out, 5);
        assert!(out.unplaceable.is_empty());
        assert_eq!(out.bars.len(), 3);
        let cutting: Vec<u32> = out
            .bars
            .iter()
            .flat_map(|b| &b.pieces)
            .map(|p| p.cutting_id)
            .collect();
        assert_eq!(cutting, vec![2, 2, 1]);
    }

    #[test]
    fn test_first_fit_algorithm_packs_everything() {
        let packer = Packer::new(DEFAULT_BAR_LENGTH, PlaceAlgorithm::FirstFit, true);
        let out = packer.pack(vec![unit(100.0, 3), unit(60.0, 2), unit(45.0, 2)]);
        assert_outcome_valid(&out, 7);
        assert!(out.unplaceable.is_empty());
        // Decreasing first-fit: 100+100, then 100+60+45, then 60+45 etc.
        assert!(out.bars.len() <= 3);
    }

    #[test]
    fn test_step_budget_falls_back_to_greedy() {
        let mut packer = flat_packer();
        packer.limits.max_steps = 1;
        let out = packer.pack(vec![unit(100.0, 2), unit(70.0, 2), unit(40.0, 1)]);
        assert_outcome_valid(&out, 5);
        assert!(out.unplaceable.is_empty());
    }

    #[test]
    fn test_expired_deadline_still_places_all_units() {
        let mut packer = flat_packer();
        packer.deadline = Some(Instant::now() - std::time::Duration::from_secs(1));
        packer.limits.max_steps = 5000;
        let units: Vec<PackUnit> = (1..=20).map(|i| unit(10.0 + i as f64, 2)).collect();
        let out = packer.pack(units);
        assert_outcome_valid(&out, 40);
        assert!(out.unplaceable.is_empty());
    }

    #[test]
    fn test_candidate_window_still_conserves() {
        let mut packer = pair_packer();
        packer.limits.max_units = 2;
        let units: Vec<PackUnit> = (0..10).map(|i| unit(30.0 + i as f64, 1)).collect();
        let out = packer.pack(units);
        assert_outcome_valid(&out, 10);
        assert!(out.unplaceable.is_empty());
    }

    #[test]
    fn test_exact_fill_has_zero_waste() {
        let out = pair_packer().pack(vec![unit(210.0, 1)]);
        assert_outcome_valid(&out, 1);
        assert_eq!(out.bars.len(), 1);
        assert_eq!(out.bars[0].waste(), Len::ZERO);
    }

    #[test]
    fn test_empty_pool() {
        let out = pair_packer().pack(vec![]);
        assert!(out.bars.is_empty());
        assert!(out.unplaceable.is_empty());
    }
}
