use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use coop_formats::SectionFile;
use log::info;
use serde::Serialize;

use coop_lobby::scheduler::DeferredAction;
use coop_lobby::sim::{pump, SimHost};
use coop_lobby::{Airport, GameEvent, Lobby, LobbyConfig, MissionNumber, MissionState};

/// Co-op lobby toolkit: list the mission catalog, dry-run the preload
/// transform on one mission file, or run a scripted lobby session
/// against the in-memory host.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Lobby configuration JSON; built-in defaults when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List the selectable missions and exit.
    #[arg(long)]
    list: bool,

    /// Run the preload transform over a mission file and print the
    /// report.
    #[arg(long, value_name = "FILE")]
    preload: Option<PathBuf>,

    /// Write the transformed mission to this path.
    #[arg(long, value_name = "FILE", requires = "preload")]
    out: Option<PathBuf>,

    /// Airport available to the preload transform, as `name:x:y`.
    /// Repeatable.
    #[arg(long = "airport", value_name = "NAME:X:Y")]
    airports: Vec<String>,

    /// Run a scripted lobby session and print what happened.
    #[arg(long)]
    simulate: bool,

    /// Emit the simulation outcome as JSON.
    #[arg(long, requires = "simulate")]
    report_json: bool,
}

#[derive(Debug, Serialize)]
struct MissionSummary {
    number: MissionNumber,
    display: String,
    state: MissionState,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    clock: f64,
    missions: Vec<MissionSummary>,
    chat: Vec<String>,
    fired_actions: Vec<DeferredAction>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LobbyConfig::from_json_file(path)?,
        None => LobbyConfig::default(),
    };

    if args.list {
        return list_catalog(&config);
    }
    if let Some(path) = &args.preload {
        return preload_file(path, &args);
    }
    if args.simulate {
        return simulate(&config, args.report_json);
    }

    bail!("nothing to do: pass --list, --preload <file> or --simulate");
}

fn list_catalog(config: &LobbyConfig) -> Result<()> {
    let entries = coop_formats::scan_missions(
        &config.missions_root,
        config.missions_subfolder.as_deref(),
        &config.map_name,
    );
    if entries.is_empty() {
        println!(
            "no missions for map '{}' under {}",
            config.map_name,
            config.missions_root.display()
        );
        return Ok(());
    }
    for entry in entries {
        println!("{}", entry.display_name);
    }
    Ok(())
}

fn parse_airport(text: &str) -> Result<Airport> {
    let mut parts = text.splitn(3, ':');
    let (Some(name), Some(x), Some(y)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("airport '{text}' is not in name:x:y form");
    };
    Ok(Airport {
        name: name.to_string(),
        x: x.parse().with_context(|| format!("airport '{text}': bad x"))?,
        y: y.parse().with_context(|| format!("airport '{text}': bad y"))?,
        landing_queue: 0,
        takeoff_queue: 0,
    })
}

fn preload_file(path: &PathBuf, args: &Args) -> Result<()> {
    let airports = args
        .airports
        .iter()
        .map(|text| parse_airport(text))
        .collect::<Result<Vec<_>>>()?;

    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut file =
        SectionFile::parse(&text).with_context(|| format!("parsing {}", path.display()))?;

    let report = coop_lobby::preload::prepare_preload(&mut file, &airports);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(out) = &args.out {
        fs::write(out, file.to_text()).with_context(|| format!("writing {}", out.display()))?;
        info!("transformed mission written to {}", out.display());
    }
    Ok(())
}

/// Drive a small scripted world through the battle-start path and a
/// slice of the mission lifecycle, then report what the lobby did.
fn simulate(config: &LobbyConfig, report_json: bool) -> Result<()> {
    let mut host = SimHost::new();
    let primary = host.add_player(1, "Host", 1);
    host.set_primary(primary);
    host.add_player(2, "Wingman", 1);
    host.spawn_lobby_group(1, "Lobby.01", 2, 2);

    let mut lobby = Lobby::new(host, config.clone());
    lobby.handle(GameEvent::BattleStarted);
    pump(&mut lobby);

    if lobby.missions().is_empty() {
        // Random opening disabled: fall back to the first catalog entry.
        let files = lobby.mission_files();
        let Some(entry) = files.first() else {
            bail!(
                "no missions for map '{}' under {}",
                config.map_name,
                config.missions_root.display()
            );
        };
        if lobby.open_mission(entry).is_none() {
            bail!("could not open {}", entry.display_name);
        }
        pump(&mut lobby);
    }

    // Play out the pending phase plus a slice of the running mission.
    let horizon = config.pending_delay() + 30.0;
    let mut elapsed = 0.0;
    while elapsed < horizon {
        lobby.advance(1.0);
        pump(&mut lobby);
        elapsed += 1.0;
    }

    let report = SimulationReport {
        clock: lobby.clock(),
        missions: lobby
            .missions()
            .iter()
            .map(|m| MissionSummary {
                number: m.number,
                display: m.display_name.clone(),
                state: m.state,
            })
            .collect(),
        chat: lobby
            .host()
            .log_lines
            .iter()
            .map(|(_, line)| line.clone())
            .collect(),
        fired_actions: lobby.action_history().to_vec(),
    };

    if report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("clock: {:.0}s", report.clock);
        for mission in &report.missions {
            println!("mission #{}: {} ({:?})", mission.number, mission.display, mission.state);
        }
        for line in &report.chat {
            println!("chat: {line}");
        }
    }
    Ok(())
}
