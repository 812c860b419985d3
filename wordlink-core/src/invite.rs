//! InviteInfo: the structured payload of an INVITE frame, carried as compact JSON.

use serde::{Deserialize, Serialize};

/// Description of a proposed new game. Produced once per invitation, consumed once by the receiver.
///
/// The dictionary named by `dict` must be installed on the inviting side before the invite is
/// queued; the transport does not check dictionary availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteInfo {
    pub game_id: i32,
    pub lang: i32,
    pub dict: String,
    #[serde(rename = "nPlayersT")]
    pub n_players_total: u8,
    #[serde(rename = "nPlayersH")]
    pub n_players_here: u8,
    /// Display name for the new game, if the inviter set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub invite_id: String,
}

impl InviteInfo {
    /// New invitation with a fresh invite id.
    pub fn new(
        game_id: i32,
        lang: i32,
        dict: impl Into<String>,
        n_players_total: u8,
        n_players_here: u8,
    ) -> Self {
        Self {
            game_id,
            lang,
            dict: dict.into(),
            n_players_total,
            n_players_here,
            name: None,
            room: None,
            invite_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Player counts are consistent and the language id is set.
    pub fn is_valid(&self) -> bool {
        self.lang >= 0
            && self.n_players_here > 0
            && self.n_players_here <= self.n_players_total
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_short_keys() {
        let info = InviteInfo::new(0x42, 1, "CollegeEng_2to8", 2, 1);
        let json = info.to_json().unwrap();
        assert!(json.contains("\"gameId\":66"));
        assert!(json.contains("\"nPlayersT\":2"));
        assert!(json.contains("\"nPlayersH\":1"));
        assert!(!json.contains("\"name\""));
        assert_eq!(InviteInfo::from_json(&json).unwrap(), info);
    }

    #[test]
    fn optional_fields_survive() {
        let info = InviteInfo::new(7, 2, "Français", 4, 2)
            .with_name("Sunday game")
            .with_room("kitchen");
        let back = InviteInfo::from_json(&info.to_json().unwrap()).unwrap();
        assert_eq!(back.name.as_deref(), Some("Sunday game"));
        assert_eq!(back.room.as_deref(), Some("kitchen"));
    }

    #[test]
    fn invite_ids_are_fresh() {
        let a = InviteInfo::new(1, 1, "d", 2, 1);
        let b = InviteInfo::new(1, 1, "d", 2, 1);
        assert_ne!(a.invite_id, b.invite_id);
    }

    #[test]
    fn validity() {
        assert!(InviteInfo::new(1, 0, "d", 2, 1).is_valid());
        assert!(!InviteInfo::new(1, -1, "d", 2, 1).is_valid());
        assert!(!InviteInfo::new(1, 1, "d", 2, 0).is_valid());
        assert!(!InviteInfo::new(1, 1, "d", 2, 3).is_valid());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(InviteInfo::from_json("{\"gameId\":1}").is_err());
        assert!(InviteInfo::from_json("not json").is_err());
    }
}
