//! Player/session store contract
//!
//! Players are keyed by the device id they first logged in from. Sessions
//! are opaque tokens mapping back to a player id.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Dragon every new player starts with
pub const STARTING_DRAGON: &str = "fire";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("player not found: {0}")]
    PlayerNotFound(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Player profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: String,
    pub username: String,
    pub level: u32,
    pub coins: u64,
    pub gems: u64,
    pub dragons: Vec<String>,
    pub current_episode: u32,
    pub current_level: u32,
}

impl Player {
    /// Create a fresh player profile
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            level: 1,
            coins: 0,
            gems: 0,
            dragons: vec![STARTING_DRAGON.to_string()],
            current_episode: 1,
            current_level: 1,
        }
    }
}

/// Partial update applied by `PlayerStore::update`
///
/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub coins: Option<u64>,
    #[serde(default)]
    pub gems: Option<u64>,
    #[serde(default)]
    pub dragons: Option<Vec<String>>,
    #[serde(default)]
    pub current_episode: Option<u32>,
    #[serde(default)]
    pub current_level: Option<u32>,
}

impl PlayerUpdate {
    fn apply(self, player: &mut Player) {
        if let Some(username) = self.username {
            player.username = username;
        }
        if let Some(level) = self.level {
            player.level = level;
        }
        if let Some(coins) = self.coins {
            player.coins = coins;
        }
        if let Some(gems) = self.gems {
            player.gems = gems;
        }
        if let Some(dragons) = self.dragons {
            player.dragons = dragons;
        }
        if let Some(episode) = self.current_episode {
            player.current_episode = episode;
        }
        if let Some(level) = self.current_level {
            player.current_level = level;
        }
    }
}

/// Progress report sent at the end of a level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameProgress {
    pub player_id: String,
    pub episode: u32,
    pub level: u32,
    pub score: u64,
    pub coins_collected: u64,
    #[serde(default)]
    pub dragons_used: Vec<String>,
}

/// A login session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub player: Player,
}

/// Store counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_players: usize,
    pub active_sessions: usize,
}

/// Player/session store
pub trait PlayerStore: Send + Sync {
    /// Return the player registered for `device_id`, creating one if needed,
    /// and open a new session for it.
    fn create_or_fetch(&self, device_id: &str, username: Option<&str>) -> StoreResult<Session>;

    /// Look up a player by id
    fn get(&self, player_id: &str) -> StoreResult<Player>;

    /// Apply a partial update to a player
    fn update(&self, player_id: &str, update: PlayerUpdate) -> StoreResult<Player>;

    /// Record end-of-level progress
    fn save_progress(&self, progress: &GameProgress) -> StoreResult<Player>;

    /// Player and session counts
    fn stats(&self) -> StoreResult<StoreStats>;
}

#[derive(Debug, Default)]
struct StoreState {
    players: HashMap<String, Player>,
    sessions: HashMap<String, String>,
}

/// Process-local store, suitable for tests and single-instance servers
#[derive(Debug, Default)]
pub struct InMemoryPlayerStore {
    state: Mutex<StoreState>,
}

impl InMemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerStore for InMemoryPlayerStore {
    fn create_or_fetch(&self, device_id: &str, username: Option<&str>) -> StoreResult<Session> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;

        let next_index = state.players.len();
        let player = state
            .players
            .entry(device_id.to_string())
            .or_insert_with(|| {
                let name = username
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Dragon{}", next_index));
                Player::new(device_id, name)
            })
            .clone();

        let token = format!(
            "session_{}_{}_{}",
            device_id,
            Utc::now().timestamp_millis(),
            state.sessions.len()
        );
        state.sessions.insert(token.clone(), device_id.to_string());

        Ok(Session { token, player })
    }

    fn get(&self, player_id: &str) -> StoreResult<Player> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        state
            .players
            .get(player_id)
            .cloned()
            .ok_or_else(|| StoreError::PlayerNotFound(player_id.to_string()))
    }

    fn update(&self, player_id: &str, update: PlayerUpdate) -> StoreResult<Player> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let player = state
            .players
            .get_mut(player_id)
            .ok_or_else(|| StoreError::PlayerNotFound(player_id.to_string()))?;
        update.apply(player);
        Ok(player.clone())
    }

    fn save_progress(&self, progress: &GameProgress) -> StoreResult<Player> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let player = state
            .players
            .get_mut(&progress.player_id)
            .ok_or_else(|| StoreError::PlayerNotFound(progress.player_id.clone()))?;
        player.current_episode = progress.episode;
        player.current_level = progress.level;
        player.coins += progress.coins_collected;
        Ok(player.clone())
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(StoreStats {
            total_players: state.players.len(),
            active_sessions: state.sessions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_new_player_defaults() {
        let store = InMemoryPlayerStore::new();
        let session = store.create_or_fetch("device-a", None).unwrap();

        assert!(session.token.starts_with("session_device-a_"));
        assert_eq!(session.player.user_id, "device-a");
        assert_eq!(session.player.username, "Dragon0");
        assert_eq!(session.player.level, 1);
        assert_eq!(session.player.dragons, vec!["fire".to_string()]);
    }

    #[test]
    fn test_fetch_existing_player_keeps_profile() {
        let store = InMemoryPlayerStore::new();
        store.create_or_fetch("device-a", Some("ember")).unwrap();
        let again = store.create_or_fetch("device-a", Some("other")).unwrap();

        assert_eq!(again.player.username, "ember");
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_players, 1);
        assert_eq!(stats.active_sessions, 2);
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let store = InMemoryPlayerStore::new();
        store.create_or_fetch("device-a", Some("ember")).unwrap();

        let updated = store
            .update(
                "device-a",
                PlayerUpdate {
                    gems: Some(12),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.gems, 12);
        assert_eq!(updated.username, "ember");
        assert_eq!(updated.coins, 0);
    }

    #[test]
    fn test_update_unknown_player() {
        let store = InMemoryPlayerStore::new();
        let err = store.update("ghost", PlayerUpdate::default()).unwrap_err();
        assert!(matches!(err, StoreError::PlayerNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_save_progress_accumulates_coins() {
        let store = InMemoryPlayerStore::new();
        store.create_or_fetch("device-a", None).unwrap();

        let progress = GameProgress {
            player_id: "device-a".to_string(),
            episode: 2,
            level: 5,
            score: 900,
            coins_collected: 40,
            dragons_used: vec!["fire".to_string()],
        };
        store.save_progress(&progress).unwrap();
        let player = store.save_progress(&progress).unwrap();

        assert_eq!(player.current_episode, 2);
        assert_eq!(player.current_level, 5);
        assert_eq!(player.coins, 80);
    }
}
