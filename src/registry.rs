//! Tracks known games (Steam app id -> display name) across benchmark runs.
//! Ported from the Python original's `games/registry.py`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEntry {
    pub steam_app_id: String,
    pub display_name: String,
    pub cover_url: String,
    pub added_at: DateTime<Utc>,
    pub canonical_id: String,
}

impl GameEntry {
    fn default_cover_url(app_id: &str) -> String {
        format!("https://cdn.cloudflare.steamstatic.com/steam/apps/{app_id}/header.jpg")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    games: HashMap<String, GameEntry>,
}

pub struct GameRegistry {
    path: PathBuf,
    games: HashMap<String, GameEntry>,
}

impl GameRegistry {
    /// Loads the registry from `path`. A corrupted or missing file starts an
    /// empty registry rather than failing — the registry is a convenience
    /// index, not the source of truth (the storage directory layout is).
    pub fn load(path: PathBuf) -> Self {
        let games = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str::<RegistryFile>(&contents).ok())
            .map(|f| f.games)
            .unwrap_or_default();
        Self { path, games }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = RegistryFile {
            games: self.games.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        crate::storage::write_atomic(&self.path, contents.as_bytes())?;
        Ok(())
    }

    pub fn get(&self, app_id: &str) -> Option<&GameEntry> {
        self.games.get(app_id)
    }

    pub fn get_or_create(
        &mut self,
        app_id: &str,
        display_name: &str,
        cover_url: Option<String>,
    ) -> Result<GameEntry> {
        if let Some(existing) = self.games.get(app_id) {
            return Ok(existing.clone());
        }
        let entry = GameEntry {
            steam_app_id: app_id.to_string(),
            display_name: display_name.to_string(),
            cover_url: cover_url.unwrap_or_else(|| GameEntry::default_cover_url(app_id)),
            added_at: Utc::now(),
            canonical_id: format!("steam_{app_id}"),
        };
        self.games.insert(app_id.to_string(), entry.clone());
        self.save()?;
        Ok(entry)
    }

    pub fn get_canonical_id(&self, app_id: &str) -> String {
        format!("steam_{app_id}")
    }

    pub fn list_all(&self) -> Vec<&GameEntry> {
        self.games.values().collect()
    }

    pub fn find_by_name(&self, query: &str) -> Vec<&GameEntry> {
        let query_lower = query.to_lowercase();
        self.games
            .values()
            .filter(|g| g.display_name.to_lowercase().contains(&query_lower))
            .collect()
    }

    pub fn remove(&mut self, app_id: &str) -> Result<Option<GameEntry>> {
        let removed = self.games.remove(app_id);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Rebuilds the registry from `steam_*` directories under `games_root`,
    /// each expected to hold a `game_info.json` written by `get_or_create`.
    /// Used to recover a registry that was lost or never written.
    pub fn sync_from_folders(&mut self, games_root: &Path) -> Result<usize> {
        let mut recovered = 0;
        let Ok(entries) = std::fs::read_dir(games_root) else {
            return Ok(0);
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(app_id) = dir_name.strip_prefix("steam_") else {
                continue;
            };
            if self.games.contains_key(app_id) {
                continue;
            }

            let info_path = path.join("game_info.json");
            if let Ok(contents) = std::fs::read_to_string(&info_path) {
                if let Ok(entry) = serde_json::from_str::<GameEntry>(&contents) {
                    self.games.insert(app_id.to_string(), entry);
                    recovered += 1;
                }
            }
        }

        if recovered > 0 {
            self.save()?;
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupted_registry_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();
        let registry = GameRegistry::load(path);
        assert!(registry.list_all().is_empty());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = GameRegistry::load(dir.path().join("registry.json"));
        let a = registry.get_or_create("440", "Team Fortress 2", None).unwrap();
        let b = registry.get_or_create("440", "Different Name", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.display_name, "Team Fortress 2");
    }

    #[test]
    fn find_by_name_is_case_insensitive_substring() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = GameRegistry::load(dir.path().join("registry.json"));
        registry.get_or_create("440", "Team Fortress 2", None).unwrap();
        assert_eq!(registry.find_by_name("fortress").len(), 1);
        assert_eq!(registry.find_by_name("nonexistent").len(), 0);
    }

    #[test]
    fn sync_from_folders_recovers_entries() {
        let dir = tempfile::tempdir().unwrap();
        let games_root = dir.path().join("games");
        let game_dir = games_root.join("steam_730");
        std::fs::create_dir_all(&game_dir).unwrap();
        let entry = GameEntry {
            steam_app_id: "730".to_string(),
            display_name: "Counter-Strike 2".to_string(),
            cover_url: "https://example.com/x.jpg".to_string(),
            added_at: Utc::now(),
            canonical_id: "steam_730".to_string(),
        };
        std::fs::write(
            game_dir.join("game_info.json"),
            serde_json::to_string(&entry).unwrap(),
        )
        .unwrap();

        let mut registry = GameRegistry::load(dir.path().join("registry.json"));
        let recovered = registry.sync_from_folders(&games_root).unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(registry.get("730").unwrap().display_name, "Counter-Strike 2");
    }
}
