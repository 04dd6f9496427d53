use crate::plan::PlannedBar;

const BAR_WIDTH: usize = 80;

/// Draws one bar as a proportional segment diagram, one segment per
/// output row, with the waste tail shown as dots:
///
/// `|140 |70  |......|`
pub fn render_bar(bar: &PlannedBar) -> String {
    let capacity = bar.capacity.hundredths() as f64;
    if capacity == 0.0 {
        return String::new();
    }
    let scale = BAR_WIDTH as f64 / capacity;

    let mut line = String::from("|");
    for piece in &bar.pieces {
        let cells = ((piece.total_length() as f64 * scale).round() as usize).max(1);
        let label = if piece.cutting_id > 1 {
            format!("{}x{}", piece.length(), piece.cutting_id)
        } else {
            piece.length().to_string()
        };
        line.push_str(&segment(&label, cells));
        line.push('|');
    }

    let waste = bar.waste();
    if !waste.is_zero() {
        let cells = ((waste.hundredths() as f64 * scale).round() as usize).max(1);
        line.push_str(&".".repeat(cells));
        line.push('|');
    }
    line.push('\n');
    line
}

fn segment(label: &str, cells: usize) -> String {
    let mut s = String::with_capacity(cells);
    for ch in label.chars().take(cells) {
        s.push(ch);
    }
    while s.chars().count() < cells {
        s.push(' ');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanConfig, Planner};
    use crate::normalize::tests::row;
    use crate::split::SplitStrategy;

    #[test]
    fn test_render_full_bar_has_no_waste_tail() {
        let input = vec![row("A", "Red", 70.0, 2), row("A", "Red", 140.0, 1)];
        let plan = Planner::new(PlanConfig {
            split_strategy: SplitStrategy::Flat,
            ..PlanConfig::default()
        })
        .plan(&input);
        let full = render_bar(&plan.bars[0]);
        assert!(full.contains("140"));
        assert!(full.contains("70"));
        assert!(!full.contains('.'));
    }

    #[test]
    fn test_render_waste_tail() {
        let input = vec![row("A", "Red", 100.0, 1)];
        let plan = Planner::new(PlanConfig::default()).plan(&input);
        let out = render_bar(&plan.bars[0]);
        assert!(out.contains("100"));
        assert!(out.contains("..."));
        assert!(out.ends_with("|\n"));
    }

    #[test]
    fn test_render_merged_piece_label() {
        let input = vec![row("A", "Red", 50.0, 4)];
        let plan = Planner::new(PlanConfig::default()).plan(&input);
        let out = render_bar(&plan.bars[0]);
        assert!(out.contains("50x4"));
    }
}
