//! Wire-compatible types for the status record endpoint and the session identity.
//!
//! Records travel as snake_case JSON objects. Statuses are small integers:
//!
//! | Code | Status      |
//! |------|-------------|
//! | `0`  | `Completed` |
//! | `1`  | `Playing`   |
//! | `2`  | `Want`      |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GameStatusError;

// ── Type aliases ────────────────────────────────────────────────────

/// Catalog identifier of a game.
pub type GameId = u64;

// ── Enums ───────────────────────────────────────────────────────────

/// A user's relationship to one game.
///
/// There is no `Untracked` variant: the absence of a record is the
/// untracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GameStatus {
    /// Finished games.
    Completed,
    /// Currently playing.
    Playing,
    /// Wanted games.
    Want,
}

impl GameStatus {
    /// Every status, in wire-code order.
    pub const ALL: [GameStatus; 3] = [GameStatus::Completed, GameStatus::Playing, GameStatus::Want];

    /// Wire code for this status.
    pub fn code(self) -> u8 {
        match self {
            GameStatus::Completed => 0,
            GameStatus::Playing => 1,
            GameStatus::Want => 2,
        }
    }

    /// Short label shown next to the status.
    pub fn label(self) -> &'static str {
        match self {
            GameStatus::Completed => "Completed",
            GameStatus::Playing => "Playing",
            GameStatus::Want => "Want",
        }
    }

    /// Caption shown under the label on the "add to library" controls.
    pub fn caption(self) -> &'static str {
        match self {
            GameStatus::Completed => "Finished Games",
            GameStatus::Playing => "Currently Playing",
            GameStatus::Want => "Wanted games",
        }
    }
}

impl From<GameStatus> for u8 {
    fn from(status: GameStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for GameStatus {
    type Error = GameStatusError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(GameStatus::Completed),
            1 => Ok(GameStatus::Playing),
            2 => Ok(GameStatus::Want),
            other => Err(GameStatusError::InvalidStatusCode(other)),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stable identifier of a signed-in user.
///
/// The backend hands out either numeric or string ids; both are kept
/// verbatim and rendered without quotes in request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{id}"),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        UserId::Numeric(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId::Text(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId::Text(id)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// Backend-side account data attached to an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseData {
    pub id: UserId,
    /// Any other fields the auth flow attached. Kept opaque.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The authenticated user's session record, as produced by the external
/// authentication flow.
///
/// Only `database_data.id` is interpreted; everything else rides along
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub database_data: DatabaseData,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    /// Build an identity carrying nothing but a user id.
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            database_data: DatabaseData {
                id: id.into(),
                extra: serde_json::Map::new(),
            },
            extra: serde_json::Map::new(),
        }
    }

    /// The user id used to address status records.
    pub fn user_id(&self) -> &UserId {
        &self.database_data.id
    }
}

/// The persisted `(user, game, status)` tuple.
///
/// At most one record exists per `(user_id, game_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub game_id: GameId,
    pub user_id: UserId,
    pub current_status: GameStatus,
}

/// Body of a delete request: the pair to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    pub game_id: GameId,
    pub user_id: UserId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_wire_mapping() {
        assert_eq!(GameStatus::Completed.code(), 0);
        assert_eq!(GameStatus::Playing.code(), 1);
        assert_eq!(GameStatus::Want.code(), 2);
        for status in GameStatus::ALL {
            assert_eq!(GameStatus::try_from(status.code()), Ok(status));
        }
    }

    #[test]
    fn unknown_status_code_is_rejected() {
        assert_eq!(
            GameStatus::try_from(3_u8),
            Err(GameStatusError::InvalidStatusCode(3))
        );
        assert!(serde_json::from_str::<GameStatus>("7").is_err());
    }

    #[test]
    fn labels_and_captions() {
        assert_eq!(GameStatus::Want.to_string(), "Want");
        assert_eq!(GameStatus::Completed.caption(), "Finished Games");
        assert_eq!(GameStatus::Playing.caption(), "Currently Playing");
    }

    #[test]
    fn user_id_displays_without_quotes() {
        assert_eq!(UserId::from(42_u64).to_string(), "42");
        assert_eq!(UserId::from("abc-1").to_string(), "abc-1");
    }
}
