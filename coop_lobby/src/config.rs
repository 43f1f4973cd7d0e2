use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Lobby settings, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Root folder containing the available mission files.
    pub missions_root: PathBuf,
    /// Optional sub-folder below the root; `None` exposes everything.
    pub missions_subfolder: Option<String>,
    /// Only missions whose `MAIN.MAP` matches are selectable.
    pub map_name: String,
    /// Player names with hosting permissions beyond the primary player.
    pub host_players: Vec<String>,
    /// Minutes a random mission stays pending before it is started.
    pub pending_minutes: u64,
    /// Minutes between two random mission openings.
    pub cycle_minutes: u64,
    /// Minutes a random mission runs before it is closed.
    pub duration_minutes: u64,
    /// Open a random mission on battle start even on a listen server.
    pub force_random: bool,
    /// Fixed RNG seed for reproducible mission cycles.
    pub rng_seed: Option<u64>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        LobbyConfig {
            missions_root: PathBuf::from("missions"),
            missions_subfolder: None,
            map_name: String::new(),
            host_players: Vec::new(),
            pending_minutes: 5,
            cycle_minutes: 15,
            duration_minutes: 60,
            force_random: true,
            rng_seed: None,
        }
    }
}

impl LobbyConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading lobby config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing lobby config {}", path.display()))
    }

    pub fn pending_delay(&self) -> f64 {
        (self.pending_minutes * 60) as f64
    }

    pub fn cycle_delay(&self) -> f64 {
        (self.cycle_minutes * 60) as f64
    }

    pub fn duration(&self) -> f64 {
        (self.duration_minutes * 60) as f64
    }
}
