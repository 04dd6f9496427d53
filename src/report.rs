use serde::{Deserialize, Serialize};

use crate::packer::Unplaceable;
use crate::plan::Plan;

/// One row of the final cutting table, serialized under the exact column
/// names the downstream spreadsheet writer expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRow {
    #[serde(rename = "Order No")]
    pub order_no: String,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Material Code")]
    pub material_code: String,
    #[serde(rename = "Material Position")]
    pub material_position: String,
    #[serde(rename = "Color")]
    pub color: String,
    #[serde(rename = "(W/H)")]
    pub width_height: String,
    #[serde(rename = "Length")]
    pub length: f64,
    #[serde(rename = "Angles")]
    pub angles: String,
    #[serde(rename = "Qty")]
    pub qty: u32,
    #[serde(rename = "Cart No")]
    pub cart_no: u32,
    #[serde(rename = "Material Length")]
    pub material_length: f64,
    #[serde(rename = "Cutting ID")]
    pub cutting_id: u32,
    #[serde(rename = "Pieces ID")]
    pub pieces_id: u32,
    #[serde(rename = "Window Number")]
    pub window_number: String,
    #[serde(rename = "Grid")]
    pub grid: String,
    #[serde(rename = "LOCK")]
    pub lock: String,
    #[serde(rename = "Nailing Fin")]
    pub nailing_fin: String,
}

/// Flattens a plan into output rows, bar by bar in cart order.
pub fn plan_rows(plan: &Plan) -> Vec<PlanRow> {
    plan.bars
        .iter()
        .flat_map(|bar| {
            bar.pieces.iter().map(|piece| PlanRow {
                order_no: piece.attrs.order_no.clone(),
                kind: piece.attrs.kind.clone(),
                material_code: piece.attrs.material_code.clone(),
                material_position: piece.attrs.material_position.clone(),
                color: piece.attrs.color.clone(),
                width_height: piece.attrs.width_height.clone(),
                length: piece.length().units(),
                angles: piece.attrs.angles.clone(),
                qty: piece.qty,
                cart_no: bar.cart_no,
                material_length: bar.capacity.units(),
                cutting_id: piece.cutting_id,
                pieces_id: piece.pieces_id,
                window_number: piece.attrs.window_number.clone(),
                grid: piece.attrs.grid.clone(),
                lock: piece.attrs.lock.clone(),
                nailing_fin: piece.attrs.nailing_fin.clone(),
            })
        })
        .collect()
}

/// Serializable view of a unit that could not be placed.
#[derive(Debug, Clone, Serialize)]
pub struct UnplaceableRow {
    pub material_code: String,
    pub color: String,
    pub length: f64,
    pub pieces: u32,
    pub reason: String,
}

pub fn unplaceable_rows(unplaceable: &[Unplaceable]) -> Vec<UnplaceableRow> {
    unplaceable
        .iter()
        .map(|u| UnplaceableRow {
            material_code: u.unit.attrs.material_code.clone(),
            color: u.unit.attrs.color.clone(),
            length: u.unit.length().units(),
            pieces: u.unit.multiplicity,
            reason: u.reason.to_string(),
        })
        .collect()
}
