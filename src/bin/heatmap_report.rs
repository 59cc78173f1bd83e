//! Heatmap / analytics report
//!
//! Loads the legend, species catalog and store snapshot named by the
//! environment (`SCOUTING_LEGEND`, `SCOUTING_SPECIES`, `SCOUTING_SNAPSHOT`)
//! and prints one report as JSON.
//!
//! Usage:
//!   heatmap_report heatmap <farm-id> <week> <year>
//!   heatmap_report weekly  <farm-id> <week> <year>
//!   heatmap_report monthly <farm-id> <year> <month>

use anyhow::{bail, Context, Result};
use scouting_heatmap::CoreConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: heatmap_report <heatmap|weekly|monthly> <farm-id> <a> <b>";

fn parse_arg<T: std::str::FromStr>(args: &[String], idx: usize, name: &str) -> Result<T> {
    let raw = args
        .get(idx)
        .with_context(|| format!("Missing <{}>\n{}", name, USAGE))?;
    raw.parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid <{}>: '{}'", name, raw))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scouting_heatmap=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = args.first().map(String::as_str).unwrap_or_default();
    let farm_id: String = parse_arg(&args, 1, "farm-id")?;

    let config = CoreConfig::from_env();
    let service = config.build_service()?;

    let json = match mode {
        "heatmap" => {
            let week: u32 = parse_arg(&args, 2, "week")?;
            let year: i32 = parse_arg(&args, 3, "year")?;
            serde_json::to_string_pretty(&service.get_heatmap(&farm_id, week, year)?)?
        }
        "weekly" => {
            let week: u32 = parse_arg(&args, 2, "week")?;
            let year: i32 = parse_arg(&args, 3, "year")?;
            serde_json::to_string_pretty(&service.get_weekly_analytics(&farm_id, week, year)?)?
        }
        "monthly" => {
            let year: i32 = parse_arg(&args, 2, "year")?;
            let month: u32 = parse_arg(&args, 3, "month")?;
            serde_json::to_string_pretty(&service.get_monthly_report(&farm_id, year, month)?)?
        }
        other => bail!("Unknown report '{}'\n{}", other, USAGE),
    };

    println!("{}", json);
    Ok(())
}
