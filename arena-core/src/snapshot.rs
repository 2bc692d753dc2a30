//! Inbound tick snapshot as delivered by the transport.

use serde::{Deserialize, Serialize};

use crate::constants::pickup_value;
use crate::grid::Position;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSize {
    pub cols: usize,
    pub rows: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSnapshot {
    #[serde(default)]
    pub id: u64,
    pub timestamp_ms: u64,
    pub size: MapSize,
    pub map: Vec<Vec<u8>>,
    pub players: Vec<PlayerRecord>,
    #[serde(default)]
    pub bombs: Vec<BombRecord>,
    #[serde(default)]
    pub items: Vec<DroppedItem>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub tag_player_id: Option<String>,
    #[serde(default)]
    pub remaining_time_ms: u64,
}

impl TickSnapshot {
    pub fn player(&self, id: &str) -> Option<&PlayerRecord> {
        self.players.iter().find(|player| player.id == id)
    }

    /// Event tag addressed to `agent_id`, if any.
    pub fn event_for(&self, agent_id: &str) -> Option<EventTag> {
        let tag = self.tag.as_deref()?;
        if self.tag_player_id.as_deref() != Some(agent_id) {
            return None;
        }
        Some(EventTag::parse(tag))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub position: Position,
    #[serde(default)]
    pub blast_power: u32,
    #[serde(default)]
    pub is_empowered: bool,
    #[serde(default)]
    pub current_weapon: u8,
    #[serde(default)]
    pub lives_remaining: i32,
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub special_ability_ready: bool,
    #[serde(default)]
    pub pairing_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BombRecord {
    pub position: Position,
    pub owner_id: String,
    #[serde(default)]
    pub blast_power: u32,
    pub remaining_fuse_ms: u64,
    #[serde(default)]
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedItem {
    pub position: Position,
    pub kind: u32,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl DroppedItem {
    pub fn value(&self) -> u32 {
        pickup_value(self.kind)
    }
}

/// Free-form event tag attached to a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventTag {
    StopMoving,
    MovingBanned,
    BombSetup,
    BombExploded,
    PairingComplete,
    ObjectiveLocked,
    Other(String),
}

impl EventTag {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "player:stop-moving" => Self::StopMoving,
            "player:moving-banned" => Self::MovingBanned,
            "bomb:setup" => Self::BombSetup,
            "bomb:explosed" => Self::BombExploded,
            "player:completed-wedding" => Self::PairingComplete,
            "wooden-pestle:setup" => Self::ObjectiveLocked,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Acknowledgment of a drive command, delivered outside the tick stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveAck {
    pub player_id: String,
    pub direction: String,
}
