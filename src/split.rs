use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{DemandGroup, Len, PackUnit};

/// How a group's quantity is broken into packable units.
///
/// Both strategies emit the same unit stream (`floor(qty/2)` pairs plus
/// an odd remainder); they differ downstream. `PairFirst` treats each
/// pair as a pre-committed pack the optimizer must keep whole, while
/// `Flat` lets equal lengths from different groups merge in the
/// partitioner and lets the optimizer consume a unit piece by piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitStrategy {
    #[default]
    PairFirst,
    Flat,
}

impl SplitStrategy {
    /// Whether a unit's multiplicity may be consumed partially by the
    /// optimizer.
    pub fn divisible(self) -> bool {
        matches!(self, SplitStrategy::Flat)
    }
}

/// Expands one group into units whose multiplicities sum to `qty`.
pub fn split_group(group: &DemandGroup) -> Vec<PackUnit> {
    let pairs = group.qty / 2;
    let remainder = group.qty % 2;
    let mut units = Vec::with_capacity((pairs + remainder) as usize);
    for _ in 0..pairs {
        units.push(PackUnit {
            attrs: group.attrs.clone(),
            multiplicity: 2,
        });
    }
    if remainder > 0 {
        units.push(PackUnit {
            attrs: group.attrs.clone(),
            multiplicity: 1,
        });
    }
    units
}

/// Units sharing a (material code, color) pair; the packing boundary.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub material_code: String,
    pub color: String,
    pub units: Vec<PackUnit>,
}

impl Bucket {
    pub fn total_pieces(&self) -> u64 {
        self.units.iter().map(|u| u.multiplicity as u64).sum()
    }
}

/// Splits groups and buckets the units by material and color, preserving
/// group order for bucket order. Under `Flat`, units of identical length
/// within a bucket collapse into one (multiplicity summed, first unit's
/// attributes kept), which improves combination quality when several
/// groups demand the same length.
pub fn partition(groups: &[DemandGroup], strategy: SplitStrategy) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for group in groups {
        let key = (
            group.attrs.material_code.clone(),
            group.attrs.color.clone(),
        );
        let bi = match index.get(&key) {
            Some(&i) => i,
            None => {
                index.insert(key, buckets.len());
                buckets.push(Bucket {
                    material_code: group.attrs.material_code.clone(),
                    color: group.attrs.color.clone(),
                    units: Vec::new(),
                });
                buckets.len() - 1
            }
        };
        buckets[bi].units.extend(split_group(group));
    }

    if strategy == SplitStrategy::Flat {
        for bucket in &mut buckets {
            bucket.units = merge_by_length(std::mem::take(&mut bucket.units));
        }
    }

    buckets
}

fn merge_by_length(units: Vec<PackUnit>) -> Vec<PackUnit> {
    let mut merged: Vec<PackUnit> = Vec::new();
    let mut index: HashMap<Len, usize> = HashMap::new();
    for unit in units {
        match index.get(&unit.length()) {
            Some(&i) => merged[i].multiplicity += unit.multiplicity,
            None => {
                index.insert(unit.length(), merged.len());
                merged.push(unit);
            }
        }
    }
    merged
}
