use coop_formats::SectionFile;
use log::{debug, warn};
use serde::Serialize;

use crate::host::Airport;

pub const AIR_GROUPS_SECTION: &str = "AirGroups";
pub const TAKEOFF_WAYPOINT: &str = "TAKEOFF";

/// Sections the inert preload copy does not need; the engine keeps the
/// versions already staged by the lobby mission.
const STRIPPED_SECTIONS: [&str; 5] = ["PARTS", "MAIN", "Stationary", "Buildings", "Chiefs"];

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PreloadReport {
    /// Air groups that were not idle in the source file and had idle
    /// forced on them.
    pub forced_idle: Vec<String>,
    /// Airstart groups rebased onto a synthetic take-off waypoint.
    pub rebased_airstarts: Vec<String>,
    /// Airstart groups left untouched because no airport was available.
    pub unresolved_airstarts: Vec<String>,
    /// Groups skipped because their first waypoint did not parse.
    pub malformed_groups: Vec<String>,
}

/// Rewrite a mission description into a safe, non-spawning form: every
/// air group idle with no fuel, airstarts rebased onto the nearest
/// airport, static decoration sections stripped.
pub fn prepare_preload(file: &mut SectionFile, airports: &[Airport]) -> PreloadReport {
    let mut report = PreloadReport::default();

    let groups: Vec<String> = (0..file.lines(AIR_GROUPS_SECTION))
        .filter_map(|index| file.get(AIR_GROUPS_SECTION, index).ok())
        .map(|(key, _)| key.to_string())
        .collect();

    for group in &groups {
        let was_idle = file.value_of(group, "Idle") == Ok("1");
        file.set_flag(group, "Idle", true);
        file.set_flag(group, "SpawnFromScript", false);
        file.set(group, "Fuel", "0");
        if !was_idle {
            report.forced_idle.push(group.clone());
        }

        match rebase_airstart(file, group, airports) {
            AirstartOutcome::NotAirstart => {}
            AirstartOutcome::Rebased => report.rebased_airstarts.push(group.clone()),
            AirstartOutcome::NoAirport => {
                warn!("no airport available to rebase airstart group {group}");
                report.unresolved_airstarts.push(group.clone());
            }
            AirstartOutcome::Malformed => {
                warn!("malformed first waypoint in group {group}, leaving it as is");
                report.malformed_groups.push(group.clone());
            }
        }
    }

    for section in STRIPPED_SECTIONS {
        file.delete(section);
    }

    debug!(
        "preload transform: {} groups, {} forced idle, {} airstarts rebased",
        groups.len(),
        report.forced_idle.len(),
        report.rebased_airstarts.len()
    );

    report
}

/// Idle-force pass for promoting a mission to running: unlike the
/// preload transform the description is otherwise left intact. Returns
/// the groups that were not already idle so they can be released later.
pub fn force_idle_for_start(file: &mut SectionFile) -> Vec<String> {
    let groups: Vec<String> = (0..file.lines(AIR_GROUPS_SECTION))
        .filter_map(|index| file.get(AIR_GROUPS_SECTION, index).ok())
        .map(|(key, _)| key.to_string())
        .collect();

    let mut forced = Vec::new();
    for group in groups {
        if file.value_of(&group, "Idle") != Ok("1") {
            file.set_flag(&group, "Idle", true);
            forced.push(group);
        }
    }
    forced
}

enum AirstartOutcome {
    NotAirstart,
    Rebased,
    NoAirport,
    Malformed,
}

fn rebase_airstart(file: &mut SectionFile, group: &str, airports: &[Airport]) -> AirstartOutcome {
    let way = format!("{group}_Way");
    let Ok((first_key, first_value)) = file.get(&way, 0) else {
        return AirstartOutcome::NotAirstart;
    };
    if first_key == TAKEOFF_WAYPOINT {
        return AirstartOutcome::NotAirstart;
    }

    // The group starts in the air: park it on the nearest airfield and
    // make the flight take off from there instead.
    let first_value = first_value.to_string();
    file.set_flag(group, "SetOnPark", false);

    let Some((x, y)) = parse_waypoint_position(&first_value) else {
        return AirstartOutcome::Malformed;
    };
    let Some(airport) = nearest_airport(airports, x, y) else {
        return AirstartOutcome::NoAirport;
    };

    let original: Vec<(String, String)> = (0..file.lines(&way))
        .filter_map(|index| file.get(&way, index).ok())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    file.delete(&way);
    file.add(&way, TAKEOFF_WAYPOINT, &format!("{} {} 0 0", airport.x, airport.y));
    for (key, value) in original {
        file.add(&way, &key, &value);
    }

    AirstartOutcome::Rebased
}

fn parse_waypoint_position(value: &str) -> Option<(f64, f64)> {
    let mut fields = value.split_whitespace();
    let x: f64 = fields.next()?.parse().ok()?;
    let y: f64 = fields.next()?.parse().ok()?;
    Some((x, y))
}

/// Nearest airport to a point, preferring fields whose landing and
/// takeoff queues are both empty; with no such candidate the strictly
/// nearest field wins.
pub fn nearest_airport(airports: &[Airport], x: f64, y: f64) -> Option<&Airport> {
    let by_distance = |a: &&Airport, b: &&Airport| a.distance_sq(x, y).total_cmp(&b.distance_sq(x, y));

    airports
        .iter()
        .filter(|a| a.queues_empty())
        .min_by(by_distance)
        .or_else(|| airports.iter().min_by(by_distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coop_formats::SectionFile;

    fn airport(name: &str, x: f64, y: f64, landing: usize, takeoff: usize) -> Airport {
        Airport {
            name: name.to_string(),
            x,
            y,
            landing_queue: landing,
            takeoff_queue: takeoff,
        }
    }

    fn airstart_mission() -> SectionFile {
        SectionFile::parse(
            "[MAIN]\n  MAP Map$A\n[PARTS]\n  core.100\n[AirGroups]\n  BoB_RAF.01\n[BoB_RAF.01]\n  Class Aircraft.SpitfireMkI\n  Fuel 100\n[BoB_RAF.01_Way]\n  NORMFLY 28000 19000 500 300\n  NORMFLY 31000 21000 500 300\n  LANDING 33000 22000 0 0\n",
        )
        .expect("parse")
    }

    #[test]
    fn forces_idle_and_zeroes_fuel() {
        let mut file = airstart_mission();
        let report = prepare_preload(&mut file, &[airport("A", 0.0, 0.0, 0, 0)]);

        assert_eq!(file.value_of("BoB_RAF.01", "Idle"), Ok("1"));
        assert_eq!(file.value_of("BoB_RAF.01", "SpawnFromScript"), Ok("0"));
        assert_eq!(file.value_of("BoB_RAF.01", "Fuel"), Ok("0"));
        assert_eq!(report.forced_idle, vec!["BoB_RAF.01".to_string()]);
    }

    #[test]
    fn idempotent_on_idle_and_fuel() {
        let mut file = airstart_mission();
        let airports = [airport("A", 0.0, 0.0, 0, 0)];
        prepare_preload(&mut file, &airports);
        let once = (
            file.value_of("BoB_RAF.01", "Idle").unwrap().to_string(),
            file.value_of("BoB_RAF.01", "Fuel").unwrap().to_string(),
        );

        let report = prepare_preload(&mut file, &airports);
        assert_eq!(file.value_of("BoB_RAF.01", "Idle").unwrap(), once.0);
        assert_eq!(file.value_of("BoB_RAF.01", "Fuel").unwrap(), once.1);
        // The group was already idle the second time around.
        assert!(report.forced_idle.is_empty());
    }

    #[test]
    fn airstart_gains_a_takeoff_leg_and_keeps_the_rest() {
        let mut file = airstart_mission();
        let before: Vec<(String, String)> = (0..file.lines("BoB_RAF.01_Way"))
            .map(|i| {
                let (k, v) = file.get("BoB_RAF.01_Way", i).unwrap();
                (k.to_string(), v.to_string())
            })
            .collect();

        let report = prepare_preload(&mut file, &[airport("Hawkinge", 27000.0, 18000.0, 0, 0)]);
        assert_eq!(report.rebased_airstarts, vec!["BoB_RAF.01".to_string()]);
        assert_eq!(file.value_of("BoB_RAF.01", "SetOnPark"), Ok("0"));

        let way = "BoB_RAF.01_Way";
        assert_eq!(file.lines(way), before.len() + 1);
        assert_eq!(file.get(way, 0).unwrap(), (TAKEOFF_WAYPOINT, "27000 18000 0 0"));
        for (index, (key, value)) in before.iter().enumerate() {
            let (k, v) = file.get(way, index + 1).unwrap();
            assert_eq!((k, v), (key.as_str(), value.as_str()));
        }
    }

    #[test]
    fn runway_start_is_left_alone() {
        let mut file = SectionFile::parse(
            "[AirGroups]\n  G.01\n[G.01]\n  Idle 1\n[G.01_Way]\n  TAKEOFF 100 200 0 0\n  NORMFLY 300 400 500 300\n",
        )
        .unwrap();
        let report = prepare_preload(&mut file, &[airport("A", 0.0, 0.0, 0, 0)]);
        assert!(report.rebased_airstarts.is_empty());
        assert!(report.forced_idle.is_empty());
        assert_eq!(file.lines("G.01_Way"), 2);
    }

    #[test]
    fn no_airport_leaves_the_waypoints_untouched() {
        let mut file = airstart_mission();
        let report = prepare_preload(&mut file, &[]);
        assert_eq!(report.unresolved_airstarts, vec!["BoB_RAF.01".to_string()]);
        assert_eq!(file.lines("BoB_RAF.01_Way"), 3);
        assert_eq!(file.get("BoB_RAF.01_Way", 0).unwrap().0, "NORMFLY");
    }

    #[test]
    fn malformed_waypoint_skips_only_that_group() {
        let mut file = SectionFile::parse(
            "[AirGroups]\n  Bad.01\n  Good.01\n[Bad.01]\n[Bad.01_Way]\n  NORMFLY not-a-number 19000 500 300\n[Good.01]\n[Good.01_Way]\n  NORMFLY 100 100 500 300\n",
        )
        .unwrap();
        let report = prepare_preload(&mut file, &[airport("A", 0.0, 0.0, 0, 0)]);

        assert_eq!(report.malformed_groups, vec!["Bad.01".to_string()]);
        assert_eq!(report.rebased_airstarts, vec!["Good.01".to_string()]);
        // The malformed group keeps its original single waypoint.
        assert_eq!(file.lines("Bad.01_Way"), 1);
        assert_eq!(file.lines("Good.01_Way"), 2);
    }

    #[test]
    fn strips_static_sections() {
        let mut file = airstart_mission();
        prepare_preload(&mut file, &[airport("A", 0.0, 0.0, 0, 0)]);
        assert!(!file.has_section("MAIN"));
        assert!(!file.has_section("PARTS"));
    }

    #[test]
    fn nearest_airport_prefers_empty_queues() {
        let airports = [
            airport("Busy", 10.0, 0.0, 1, 0),
            airport("Quiet", 50.0, 0.0, 0, 0),
        ];
        let picked = nearest_airport(&airports, 0.0, 0.0).unwrap();
        assert_eq!(picked.name, "Quiet");

        // With every field busy, strict distance decides.
        let busy = [
            airport("Near", 10.0, 0.0, 1, 0),
            airport("Far", 50.0, 0.0, 0, 2),
        ];
        assert_eq!(nearest_airport(&busy, 0.0, 0.0).unwrap().name, "Near");
    }

    #[test]
    fn force_idle_for_start_records_only_newly_idled_groups() {
        let mut file = SectionFile::parse(
            "[AirGroups]\n  A.01\n  B.01\n[A.01]\n  Idle 1\n[B.01]\n  Idle 0\n",
        )
        .unwrap();
        let forced = force_idle_for_start(&mut file);
        assert_eq!(forced, vec!["B.01".to_string()]);
        assert_eq!(file.value_of("A.01", "Idle"), Ok("1"));
        assert_eq!(file.value_of("B.01", "Idle"), Ok("1"));
    }
}
