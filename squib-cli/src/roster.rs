//! Player roster for a game night: who is still in, who has been eliminated.
//!
//! Each player's number is the node id of the board they wear, so the
//! eliminated set is exactly the detonate bitmap a transmitter should send.
//! The roster lives in a JSON file keyed by player number:
//!
//! ```json
//! { "1": { "number": 1, "is_alive": true }, "2": { "number": 2, "is_alive": false } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use squib_core::NodeId;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Player {
    pub number: u16,
    pub is_alive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Eliminated,
    Revived,
    /// Already in the requested state.
    Unchanged,
    /// Revive asked for while revives are not allowed.
    ReviveRefused,
    UnknownPlayer,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Roster {
    players: BTreeMap<u16, Player>,
}

impl Roster {
    /// Players `1..=count`, everyone alive.
    pub fn new(count: u16) -> Self {
        Self::with_alive(count, |_| true)
    }

    /// Players `1..=count` where only the listed numbers are alive. Used to
    /// carry the survivors of one round into the next.
    pub fn with_survivors(count: u16, survivors: &[u16]) -> Self {
        Self::with_alive(count, |n| survivors.contains(&n))
    }

    fn with_alive(count: u16, alive: impl Fn(u16) -> bool) -> Self {
        let players = (1..=count)
            .map(|number| {
                (
                    number,
                    Player {
                        number,
                        is_alive: alive(number),
                    },
                )
            })
            .collect();
        Self { players }
    }

    /// Reads the roster at `path`, or starts a fresh one of `count` players
    /// when there is none. A file that doesn't parse is moved aside to
    /// `<path>.malformed` and replaced by a fresh roster.
    pub fn load_or_new(path: &Path, count: u16) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No roster at {}, starting {} players", path.display(), count);
                return Ok(Self::new(count));
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        match serde_json::from_str::<BTreeMap<u16, Player>>(&text) {
            Ok(players) => {
                info!("Loaded {} players from {}", players.len(), path.display());
                Ok(Self { players })
            }
            Err(e) => {
                let aside = malformed_path(path);
                warn!(
                    "Roster {} is malformed ({}), moving it to {}",
                    path.display(),
                    e,
                    aside.display()
                );
                fs::rename(path, &aside)
                    .with_context(|| format!("moving {} aside", path.display()))?;
                Ok(Self::new(count))
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.players)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    pub fn set_alive(&mut self, number: u16, alive: bool, allow_revive: bool) -> Change {
        if alive && !allow_revive {
            warn!("Ignoring request to revive {number}");
            return Change::ReviveRefused;
        }
        let Some(player) = self.players.get_mut(&number) else {
            warn!("Unknown player {number}");
            return Change::UnknownPlayer;
        };
        if player.is_alive == alive {
            return Change::Unchanged;
        }
        player.is_alive = alive;
        info!(
            "Player {number} has been {}",
            if alive { "revived" } else { "eliminated" }
        );
        if alive {
            Change::Revived
        } else {
            Change::Eliminated
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive).count()
    }

    /// Node ids of every eliminated player. Numbers no board can carry are
    /// skipped with a warning.
    pub fn dead_ids(&self) -> Vec<NodeId> {
        self.players
            .values()
            .filter(|p| !p.is_alive)
            .filter_map(|p| {
                let id = NodeId::new(p.number);
                if id.is_none() {
                    warn!("Player {} has no addressable board", p.number);
                }
                id
            })
            .collect()
    }
}

fn malformed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".malformed");
    PathBuf::from(name)
}

/// One player number per line, blank lines skipped.
pub fn parse_survivor_list(text: &str) -> Result<Vec<u16>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse()
                .with_context(|| format!("bad player number {line:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{command_text, fire_bitmap};
    use squib_core::command::Command;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("squib-roster-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir.join("state.json")
    }

    #[test]
    fn test_new_roster_is_all_alive_from_one() {
        let roster = Roster::new(456);
        assert_eq!(roster.player_count(), 456);
        assert_eq!(roster.alive_count(), 456);
        assert!(roster.dead_ids().is_empty());
        assert!(!roster.players.contains_key(&0));
    }

    #[test]
    fn test_eliminate_feeds_detonate_bitmap() {
        let mut roster = Roster::new(456);
        assert_eq!(roster.set_alive(5, false, false), Change::Eliminated);
        assert_eq!(roster.set_alive(300, false, false), Change::Eliminated);
        assert_eq!(roster.set_alive(5, false, false), Change::Unchanged);

        let bits = fire_bitmap(&roster.dead_ids());
        assert_eq!(bits.iter_set().collect::<Vec<_>>(), vec![5, 300]);
        assert!(command_text(&Command::SetDetonate(bits)).starts_with("#DET,20"));
    }

    #[test]
    fn test_revive_needs_policy() {
        let mut roster = Roster::new(10);
        roster.set_alive(3, false, false);
        assert_eq!(roster.set_alive(3, true, false), Change::ReviveRefused);
        assert_eq!(roster.dead_ids(), vec![NodeId::new(3).unwrap()]);
        assert_eq!(roster.set_alive(3, true, true), Change::Revived);
        assert!(roster.dead_ids().is_empty());
    }

    #[test]
    fn test_unknown_player() {
        let mut roster = Roster::new(10);
        assert_eq!(roster.set_alive(11, false, false), Change::UnknownPlayer);
        assert_eq!(roster.alive_count(), 10);
    }

    #[test]
    fn test_survivors_only_are_alive() {
        let roster = Roster::with_survivors(6, &[2, 5]);
        assert_eq!(roster.alive_count(), 2);
        let dead: Vec<u16> = roster.dead_ids().iter().map(|id| id.get()).collect();
        assert_eq!(dead, vec![1, 3, 4, 6]);
    }

    #[test]
    fn test_save_then_load() {
        let path = scratch("save");
        let mut roster = Roster::new(20);
        roster.set_alive(7, false, false);
        roster.save(&path).unwrap();

        let loaded = Roster::load_or_new(&path, 456).unwrap();
        assert_eq!(loaded, roster);
    }

    #[test]
    fn test_missing_file_starts_fresh() {
        let path = scratch("missing");
        let _ = fs::remove_file(&path);
        assert_eq!(Roster::load_or_new(&path, 4).unwrap(), Roster::new(4));
    }

    #[test]
    fn test_malformed_file_is_moved_aside() {
        let path = scratch("malformed");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(Roster::load_or_new(&path, 3).unwrap(), Roster::new(3));
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(malformed_path(&path)).unwrap(), "{ not json");
    }

    #[test]
    fn test_reads_files_with_extra_fields() {
        let path = scratch("extra");
        fs::write(
            &path,
            r#"{ "1": { "number": 1, "is_alive": false, "image_url": "" },
                 "2": { "number": 2, "is_alive": true, "image_url": "" } }"#,
        )
        .unwrap();
        let roster = Roster::load_or_new(&path, 456).unwrap();
        assert_eq!(roster.player_count(), 2);
        assert_eq!(roster.dead_ids(), vec![NodeId::new(1).unwrap()]);
    }

    #[test]
    fn test_survivor_list() {
        assert_eq!(parse_survivor_list("3\n\n 17 \n").unwrap(), vec![3, 17]);
        assert!(parse_survivor_list("3\nx\n").is_err());
    }
}
