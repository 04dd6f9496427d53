use std::io::Read;

use clap::Parser;
use cut_planner::normalize::RawRow;
use cut_planner::packer::PlaceAlgorithm;
use cut_planner::plan::{PlanConfig, Planner};
use cut_planner::render;
use cut_planner::report;
use cut_planner::split::SplitStrategy;
use cut_planner::types::{DEFAULT_BAR_LENGTH, Len};

#[derive(Parser)]
#[command(
    name = "cut_planner",
    about = "1D cutting stock planner for linear material demand"
)]
struct Cli {
    /// JSON file with an array of demand rows ('-' for stdin)
    #[arg(long, default_value = "-")]
    input: String,

    /// Quantity splitting strategy: pair-first or flat
    #[arg(long, default_value = "pair-first", value_parser = parse_split_strategy)]
    split_strategy: SplitStrategy,

    /// Stock bar length (default: 210)
    #[arg(long, default_value_t = 210.0)]
    capacity: f64,

    /// Placement algorithm: best-combination or first-fit
    #[arg(long, default_value = "best-combination", value_parser = parse_algorithm)]
    algorithm: PlaceAlgorithm,

    /// Show ASCII layout of each bar
    #[arg(long)]
    layout: bool,

    /// Emit the plan as JSON rows instead of a listing
    #[arg(long)]
    json: bool,
}

fn parse_split_strategy(s: &str) -> Result<SplitStrategy, String> {
    match s {
        "pair-first" => Ok(SplitStrategy::PairFirst),
        "flat" => Ok(SplitStrategy::Flat),
        _ => Err(format!(
            "invalid split strategy '{}', expected: pair-first or flat",
            s
        )),
    }
}

fn parse_algorithm(s: &str) -> Result<PlaceAlgorithm, String> {
    match s {
        "best-combination" => Ok(PlaceAlgorithm::BestCombination),
        "first-fit" => Ok(PlaceAlgorithm::FirstFit),
        _ => Err(format!(
            "invalid algorithm '{}', expected: best-combination or first-fit",
            s
        )),
    }
}

fn read_rows(path: &str) -> Result<Vec<RawRow>, String> {
    let data = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?
    };
    serde_json::from_str(&data).map_err(|e| format!("invalid input JSON: {e}"))
}

fn main() {
    let cli = Cli::parse();

    let rows = read_rows(&cli.input).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let capacity = Len::from_units(cli.capacity)
        .filter(|c| !c.is_zero())
        .unwrap_or_else(|| {
            eprintln!("Error: capacity must be a positive number");
            std::process::exit(1);
        });
    if capacity != DEFAULT_BAR_LENGTH {
        eprintln!("Note: using non-standard bar length {capacity}");
    }

    let config = PlanConfig {
        split_strategy: cli.split_strategy,
        capacity,
        algorithm: cli.algorithm,
        ..PlanConfig::default()
    };
    let plan = Planner::new(config).plan(&rows);

    if cli.json {
        let rows = report::plan_rows(&plan);
        println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
    } else {
        for bar in &plan.bars {
            println!("Cart {} (waste {}):", bar.cart_no, bar.waste());
            for p in &bar.pieces {
                println!(
                    "  #{} {} {} x {} ({})",
                    p.pieces_id,
                    p.attrs.material_code,
                    p.length(),
                    p.cutting_id,
                    p.attrs.color,
                );
            }
            if cli.layout {
                print!("{}", render::render_bar(bar));
            }
            println!();
        }
    }

    for s in &plan.skipped {
        eprintln!("Skipped row {}: {}", s.row, s.reason);
    }
    for u in report::unplaceable_rows(&plan.unplaceable) {
        eprintln!(
            "Unplaceable: {} {} length {} x {} ({})",
            u.material_code, u.color, u.length, u.pieces, u.reason
        );
    }

    eprintln!(
        "Summary: {} bar{} used, {} pieces, total waste {}, {:.1}% waste",
        plan.bar_count(),
        if plan.bar_count() == 1 { "" } else { "s" },
        plan.total_pieces(),
        plan.total_waste(),
        plan.waste_percent(),
    );
}
