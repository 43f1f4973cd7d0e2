use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use coop_formats::SectionFile;

/// Inspect a mission description and list its air groups.
#[derive(Parser)]
struct Args {
    /// Path to the `.mis` file to inspect
    path: PathBuf,

    /// Emit the parsed structure as JSON section names with counts
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let text = fs::read_to_string(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    let file = SectionFile::parse(&text)?;

    if args.json {
        let summary: Vec<(String, usize)> = file
            .section_names()
            .map(|name| (name.to_string(), file.lines(name)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if let Ok(map) = file.value_of("MAIN", "MAP") {
        println!("map: {map}");
    }
    println!("sections: {}", file.section_names().count());
    println!("air groups: {}", file.lines("AirGroups"));

    for index in 0..file.lines("AirGroups") {
        let (group, _) = file.get("AirGroups", index)?;
        let way = format!("{group}_Way");
        let first = file
            .get(&way, 0)
            .map(|(k, v)| format!("{k} {v}"))
            .unwrap_or_else(|_| "<no waypoints>".to_string());
        println!("{:>4}  {:<24} first waypoint: {}", index, group, first);
    }

    Ok(())
}
