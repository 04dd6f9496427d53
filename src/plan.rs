use std::time::Instant;

use crate::normalize::{self, RawRow, SkippedRow};
use crate::packer::{Packer, PlaceAlgorithm, SearchLimits, Unplaceable};
use crate::split::{self, SplitStrategy};
use crate::types::{Bar, BarPiece, DEFAULT_BAR_LENGTH, Len};

#[derive(Debug, Clone, Copy)]
pub struct PlanConfig {
    pub split_strategy: SplitStrategy,
    pub capacity: Len,
    pub algorithm: PlaceAlgorithm,
    pub limits: SearchLimits,
    /// Wall-clock cutoff for the combination search; buckets still being
    /// searched past it finish greedily.
    pub deadline: Option<Instant>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            split_strategy: SplitStrategy::default(),
            capacity: DEFAULT_BAR_LENGTH,
            algorithm: PlaceAlgorithm::default(),
            limits: SearchLimits::default(),
            deadline: None,
        }
    }
}

/// Summary counts handed to the stage observer after each pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct StageSummary {
    pub stage: &'static str,
    /// Rows, groups, units, or bars depending on the stage.
    pub rows: usize,
    /// Physical pieces those rows represent.
    pub pieces: u64,
}

/// A bar with its global cart number and final, merged rows.
#[derive(Debug, Clone)]
pub struct PlannedBar {
    pub cart_no: u32,
    pub capacity: Len,
    pub pieces: Vec<CuttingPiece>,
}

impl PlannedBar {
    pub fn used(&self) -> u64 {
        self.pieces.iter().map(|p| p.total_length()).sum()
    }

    pub fn waste(&self) -> Len {
        Len::from_hundredths((self.capacity.hundredths() as u64).saturating_sub(self.used()) as u32)
    }
}

/// A placed row in the final plan.
#[derive(Debug, Clone)]
pub struct CuttingPiece {
    pub attrs: std::sync::Arc<crate::types::LineAttrs>,
    pub cutting_id: u32,
    pub pieces_id: u32,
    pub qty: u32,
}

impl CuttingPiece {
    pub fn length(&self) -> Len {
        self.attrs.length
    }

    pub fn total_length(&self) -> u64 {
        self.attrs.length.total(self.cutting_id)
    }
}

#[derive(Debug, Default)]
pub struct Plan {
    pub bars: Vec<PlannedBar>,
    pub skipped: Vec<SkippedRow>,
    pub unplaceable: Vec<Unplaceable>,
}

impl Plan {
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn total_pieces(&self) -> u64 {
        self.bars
            .iter()
            .flat_map(|b| &b.pieces)
            .map(|p| p.cutting_id as u64)
            .sum()
    }

    pub fn total_waste(&self) -> f64 {
        self.bars
            .iter()
            .map(|b| b.waste().hundredths() as u64)
            .sum::<u64>() as f64
            / 100.0
    }

    pub fn waste_percent(&self) -> f64 {
        let stock: u64 = self
            .bars
            .iter()
            .map(|b| b.capacity.hundredths() as u64)
            .sum();
        if stock == 0 {
            return 0.0;
        }
        let used: u64 = self.bars.iter().map(|b| b.used()).sum();
        (stock - used) as f64 / stock as f64 * 100.0
    }
}

/// Runs the full pipeline: normalize, group, split, partition, pack,
/// number, and merge. Stateless per call.
pub struct Planner<'a> {
    config: PlanConfig,
    observer: Option<Box<dyn FnMut(StageSummary) + 'a>>,
}

impl<'a> Planner<'a> {
    pub fn new(config: PlanConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Installs a callback invoked with stage name and summary counts
    /// after each stage; replaces any unconditional diagnostic printing.
    pub fn with_observer(mut self, observer: impl FnMut(StageSummary) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn observe(&mut self, stage: &'static str, rows: usize, pieces: u64) {
        tracing::debug!(stage, rows, pieces, "pipeline stage");
        if let Some(observer) = &mut self.observer {
            observer(StageSummary {
                stage,
                rows,
                pieces,
            });
        }
    }

    pub fn plan(&mut self, rows: &[RawRow]) -> Plan {
        self.observe("input", rows.len(), 0);

        let normalized = normalize::normalize(rows);
        self.observe(
            "group",
            normalized.groups.len(),
            normalized.total_qty(),
        );

        let buckets = split::partition(&normalized.groups, self.config.split_strategy);
        let unit_rows: usize = buckets.iter().map(|b| b.units.len()).sum();
        let unit_pieces: u64 = buckets.iter().map(|b| b.total_pieces()).sum();
        self.observe("partition", unit_rows, unit_pieces);

        let packer = Packer {
            capacity: self.config.capacity,
            algorithm: self.config.algorithm,
            divisible: self.config.split_strategy.divisible(),
            limits: self.config.limits,
            deadline: self.config.deadline,
        };

        let mut raw_bars: Vec<Bar> = Vec::new();
        let mut unplaceable = Vec::new();
        for bucket in buckets {
            let outcome = packer.pack(bucket.units);
            tracing::debug!(
                material = %bucket.material_code,
                color = %bucket.color,
                bars = outcome.bars.len(),
                unplaceable = outcome.unplaceable.len(),
                "bucket packed"
            );
            raw_bars.extend(outcome.bars);
            unplaceable.extend(outcome.unplaceable);
        }

        let mut bars = assign(raw_bars);
        renumber(&mut bars);
        let bar_rows = bars.len();
        let placed: u64 = bars
            .iter()
            .flat_map(|b| &b.pieces)
            .map(|p| p.cutting_id as u64)
            .sum();
        self.observe("pack", bar_rows, placed);

        Plan {
            bars,
            skipped: normalized.skipped,
            unplaceable,
        }
    }
}

/// Numbers bars and their pieces, collapsing equal-length rows within a
/// bar first. The surviving row's `cutting_id` carries the combined
/// physical piece count, so placed totals (and bar waste) are unchanged
/// by the merge.
fn assign(bars: Vec<Bar>) -> Vec<PlannedBar> {
    bars.into_iter()
        .enumerate()
        .map(|(i, bar)| PlannedBar {
            cart_no: (i + 1) as u32,
            capacity: bar.capacity,
            pieces: merge_pieces(bar.pieces),
        })
        .collect()
}

fn merge_pieces(pieces: Vec<BarPiece>) -> Vec<CuttingPiece> {
    let mut merged: Vec<CuttingPiece> = Vec::new();
    for piece in pieces {
        match merged.iter_mut().find(|m| m.length() == piece.length()) {
            Some(m) => {
                m.cutting_id += piece.cutting_id;
                m.qty = m.qty.max(piece.qty);
            }
            None => merged.push(CuttingPiece {
                attrs: piece.attrs,
                cutting_id: piece.cutting_id,
                pieces_id: 0,
                qty: piece.qty,
            }),
        }
    }
    for (i, piece) in merged.iter_mut().enumerate() {
        piece.pieces_id = (i + 1) as u32;
    }
    merged
}

/// Final dense 1..N cart numbering over the concatenated output.
/// Idempotent: renumbering an already-dense plan changes nothing.
pub fn renumber(bars: &mut [PlannedBar]) {
    for (i, bar) in bars.iter_mut().enumerate() {
        bar.cart_no = (i + 1) as u32;
    }
}
