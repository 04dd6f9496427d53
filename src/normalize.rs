use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::{DemandGroup, Len, LineAttrs};

/// One input row as supplied by the spreadsheet reader: column name to
/// raw cell value.
pub type RawRow = serde_json::Map<String, Value>;

pub const COL_ORDER_NO: &str = "Order No";
pub const COL_TYPE: &str = "Type";
pub const COL_MATERIAL_CODE: &str = "Material Code";
pub const COL_MATERIAL_POSITION: &str = "Material Position";
pub const COL_COLOR: &str = "Color";
pub const COL_WIDTH_HEIGHT: &str = "(W/H)";
pub const COL_LENGTH: &str = "Length";
pub const COL_ANGLES: &str = "Angles";
pub const COL_QTY: &str = "Qty";
pub const COL_WINDOW_NUMBER: &str = "Window Number";
pub const COL_GRID: &str = "Grid";
pub const COL_LOCK: &str = "LOCK";
pub const COL_NAILING_FIN: &str = "Nailing Fin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    #[error("invalid qty")]
    InvalidQty,
    #[error("invalid length")]
    InvalidLength,
}

/// An input row excluded from planning, with the zero-based index it had
/// in the uploaded data.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct Normalized {
    /// Groups in deterministic processing order: valid rows stably sorted
    /// by (color asc, material code asc, length desc), then first
    /// appearance of each attribute key.
    pub groups: Vec<DemandGroup>,
    pub skipped: Vec<SkippedRow>,
}

impl Normalized {
    pub fn total_qty(&self) -> u64 {
        self.groups.iter().map(|g| g.qty as u64).sum()
    }
}

/// Parses, validates, sorts, and groups raw rows.
///
/// Rows with a non-positive (or non-integer) quantity or a non-positive
/// length are recorded as skipped and excluded; they never fail the run.
pub fn normalize(rows: &[RawRow]) -> Normalized {
    let mut valid: Vec<(LineAttrs, u32)> = Vec::with_capacity(rows.len());
    let mut skipped = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let Some(qty) = cell_qty(row) else {
            skipped.push(SkippedRow {
                row: idx,
                reason: SkipReason::InvalidQty,
            });
            continue;
        };
        let Some(length) = cell_length(row) else {
            skipped.push(SkippedRow {
                row: idx,
                reason: SkipReason::InvalidLength,
            });
            continue;
        };

        let attrs = LineAttrs {
            order_no: cell_text(row, COL_ORDER_NO),
            kind: cell_text(row, COL_TYPE),
            material_code: cell_text(row, COL_MATERIAL_CODE),
            material_position: cell_text(row, COL_MATERIAL_POSITION),
            color: cell_text(row, COL_COLOR),
            width_height: cell_text(row, COL_WIDTH_HEIGHT),
            length,
            angles: cell_text(row, COL_ANGLES),
            window_number: cell_text(row, COL_WINDOW_NUMBER),
            grid: cell_text(row, COL_GRID),
            lock: cell_text(row, COL_LOCK),
            nailing_fin: cell_text(row, COL_NAILING_FIN),
        };
        valid.push((attrs, qty));
    }

    // Stable sort keeps original row order for full ties.
    valid.sort_by(|(a, _), (b, _)| {
        a.color
            .cmp(&b.color)
            .then_with(|| a.material_code.cmp(&b.material_code))
            .then_with(|| b.length.cmp(&a.length))
    });

    let mut groups: Vec<DemandGroup> = Vec::new();
    let mut index: HashMap<LineAttrs, usize> = HashMap::new();
    for (attrs, qty) in valid {
        if let Some(&i) = index.get(&attrs) {
            groups[i].qty += qty;
        } else {
            index.insert(attrs.clone(), groups.len());
            groups.push(DemandGroup {
                attrs: Arc::new(attrs),
                qty,
            });
        }
    }

    Normalized { groups, skipped }
}

/// Stringifies a cell; missing cells and nulls become empty strings.
fn cell_text(row: &RawRow, col: &str) -> String {
    match row.get(col) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// A quantity is valid only as a positive integer, whether the cell holds
/// a number or a numeric string.
fn cell_qty(row: &RawRow) -> Option<u32> {
    match row.get(COL_QTY)? {
        Value::Number(n) => {
            if let Some(i) = n.as_u64() {
                u32::try_from(i).ok().filter(|&q| q > 0)
            } else {
                let f = n.as_f64()?;
                if f > 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
                    Some(f as u32)
                } else {
                    None
                }
            }
        }
        Value::String(s) => s.trim().parse::<u32>().ok().filter(|&q| q > 0),
        _ => None,
    }
}

fn cell_length(row: &RawRow) -> Option<Len> {
    let v = match row.get(COL_LENGTH)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Len::from_units(v).filter(|l| !l.is_zero())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Builds a raw row from the handful of fields the tests vary.
    pub(crate) fn row(material: &str, color: &str, length: f64, qty: i64) -> RawRow {
        let v = json!({
            COL_ORDER_NO: "SO-1",
            COL_TYPE: "frame",
            COL_MATERIAL_CODE: material,
            COL_MATERIAL_POSITION: "top",
            COL_COLOR: color,
            COL_WIDTH_HEIGHT: "W",
            COL_LENGTH: length,
            COL_ANGLES: "45/45",
            COL_QTY: qty,
            COL_WINDOW_NUMBER: "W-1",
            COL_GRID: "",
            COL_LOCK: "1",
            COL_NAILING_FIN: "",
        });
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_skips_invalid_qty_and_length() {
        let rows = vec![
            row("A", "Red", 100.0, 2),
            row("A", "Red", 100.0, 0),
            row("A", "Red", 100.0, -3),
            row("A", "Red", 0.0, 2),
            row("A", "Red", -5.0, 2),
        ];
        let n = normalize(&rows);
        assert_eq!(n.groups.len(), 1);
        assert_eq!(n.groups[0].qty, 2);
        assert_eq!(n.skipped.len(), 4);
        assert_eq!(n.skipped[0].row, 1);
        assert_eq!(n.skipped[0].reason, SkipReason::InvalidQty);
        assert_eq!(n.skipped[2].row, 3);
        assert_eq!(n.skipped[2].reason, SkipReason::InvalidLength);
    }

    #[test]
    fn test_qty_accepts_numeric_strings_rejects_fractions() {
        let mut r = row("A", "Red", 100.0, 1);
        r.insert(COL_QTY.into(), json!("4"));
        let n = normalize(std::slice::from_ref(&r));
        assert_eq!(n.groups[0].qty, 4);

        r.insert(COL_QTY.into(), json!(2.5));
        let n = normalize(std::slice::from_ref(&r));
        assert!(n.groups.is_empty());
        assert_eq!(n.skipped[0].reason, SkipReason::InvalidQty);
    }

    #[test]
    fn test_grouping_sums_qty() {
        let rows = vec![
            row("A", "Red", 100.0, 2),
            row("A", "Red", 100.0, 3),
            row("A", "Red", 90.0, 1),
        ];
        let n = normalize(&rows);
        assert_eq!(n.groups.len(), 2);
        assert_eq!(n.groups[0].qty, 5);
        assert_eq!(n.groups[1].qty, 1);
        assert_eq!(n.total_qty(), 6);
    }

    #[test]
    fn test_sort_color_material_then_length_desc() {
        let rows = vec![
            row("B", "Red", 50.0, 1),
            row("A", "White", 80.0, 1),
            row("A", "Red", 60.0, 1),
            row("A", "Red", 120.0, 1),
        ];
        let n = normalize(&rows);
        let order: Vec<(String, String, f64)> = n
            .groups
            .iter()
            .map(|g| {
                (
                    g.attrs.color.clone(),
                    g.attrs.material_code.clone(),
                    g.attrs.length.units(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("Red".into(), "A".into(), 120.0),
                ("Red".into(), "A".into(), 60.0),
                ("Red".into(), "B".into(), 50.0),
                ("White".into(), "A".into(), 80.0),
            ]
        );
    }

    #[test]
    fn test_order_no_is_part_of_group_key() {
        let mut a = row("A", "Red", 100.0, 1);
        let mut b = row("A", "Red", 100.0, 1);
        a.insert(COL_ORDER_NO.into(), json!("SO-1"));
        b.insert(COL_ORDER_NO.into(), json!("SO-2"));
        let n = normalize(&[a, b]);
        assert_eq!(n.groups.len(), 2);
    }

    #[test]
    fn test_missing_columns_become_empty_text() {
        let mut r = RawRow::new();
        r.insert(COL_QTY.into(), json!(1));
        r.insert(COL_LENGTH.into(), json!(10.0));
        let n = normalize(&[r]);
        assert_eq!(n.groups.len(), 1);
        assert_eq!(n.groups[0].attrs.material_code, "");
        assert_eq!(n.groups[0].attrs.color, "");
    }
}
