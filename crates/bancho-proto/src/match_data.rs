//! Wire representation of a multiplayer match, shared by `new`/`update`/
//! `join_success` packets.

use crate::fields::{Reader, Writer};
use crate::error::ProtoError;

pub const MAX_SLOTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotStatus {
    Free = 1,
    Locked = 2,
    NotReady = 4,
    Ready = 8,
    NoMap = 16,
    Playing = 32,
    Complete = 64,
    Quit = 128,
}

impl SlotStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Free,
            2 => Self::Locked,
            4 => Self::NotReady,
            8 => Self::Ready,
            16 => Self::NoMap,
            32 => Self::Playing,
            64 => Self::Complete,
            128 => Self::Quit,
            _ => return None,
        })
    }

    pub fn has_player(self) -> bool {
        !matches!(self, Self::Free | Self::Locked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotTeam {
    Neutral = 0,
    Blue = 1,
    Red = 2,
}

#[derive(Debug, Clone)]
pub struct SlotData {
    pub status: SlotStatus,
    pub team: SlotTeam,
    pub user_id: Option<i32>,
    pub mods: u32,
}

impl SlotData {
    pub fn free() -> Self {
        Self {
            status: SlotStatus::Free,
            team: SlotTeam::Neutral,
            user_id: None,
            mods: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchData {
    pub match_id: u16,
    pub in_progress: bool,
    pub match_type: u8,
    pub mods: u32,
    pub name: String,
    /// Empty when censored for public lobby broadcast; `name/hash` form when set.
    pub password: String,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub beatmap_md5: String,
    pub slots: [SlotData; MAX_SLOTS],
    pub host_user_id: i32,
    pub game_mode: u8,
    pub scoring_type: u8,
    pub team_type: u8,
    pub free_mods: bool,
    pub seed: i32,
}

impl MatchData {
    /// Encode for the wire, optionally with the password stripped (used
    /// when broadcasting to clients not currently inside the match).
    pub fn encode(&self, censor_password: bool) -> Vec<u8> {
        let mut w = Writer::new();
        w.u16(self.match_id);
        w.u8(self.in_progress as u8);
        w.u8(self.match_type);
        w.u32(self.mods);
        w.string(&self.name);
        if censor_password || self.password.is_empty() {
            w.string("");
        } else {
            w.string(&self.password);
        }
        w.string(&self.beatmap_name);
        w.i32(self.beatmap_id);
        w.string(&self.beatmap_md5);
        for slot in &self.slots {
            w.u8(slot.status as u8);
        }
        for slot in &self.slots {
            w.u8(slot.team as u8);
        }
        for slot in &self.slots {
            if slot.status.has_player() {
                w.i32(slot.user_id.unwrap_or(-1));
            }
        }
        w.i32(self.host_user_id);
        w.u8(self.game_mode);
        w.u8(self.scoring_type);
        w.u8(self.team_type);
        w.u8(self.free_mods as u8);
        if self.free_mods {
            for slot in &self.slots {
                w.u32(slot.mods);
            }
        }
        w.i32(self.seed);
        w.into_bytes()
    }

    pub fn decode(packet_id: u16, buf: &[u8]) -> Result<Self, ProtoError> {
        let mut r = Reader::new(packet_id, buf);
        let match_id = r.u16()?;
        let in_progress = r.u8()? != 0;
        let match_type = r.u8()?;
        let mods = r.u32()?;
        let name = r.string()?;
        let password = r.string()?;
        let beatmap_name = r.string()?;
        let beatmap_id = r.i32()?;
        let beatmap_md5 = r.string()?;

        let mut statuses = [SlotStatus::Free; MAX_SLOTS];
        for s in statuses.iter_mut() {
            let raw = r.u8()?;
            *s = SlotStatus::from_u8(raw).ok_or_else(|| ProtoError::MalformedPacket {
                packet_id,
                reason: format!("invalid slot status {raw}"),
            })?;
        }
        let mut teams = [SlotTeam::Neutral; MAX_SLOTS];
        for t in teams.iter_mut() {
            *t = match r.u8()? {
                1 => SlotTeam::Blue,
                2 => SlotTeam::Red,
                _ => SlotTeam::Neutral,
            };
        }
        let mut user_ids = [None; MAX_SLOTS];
        for (i, status) in statuses.iter().enumerate() {
            if status.has_player() {
                user_ids[i] = Some(r.i32()?);
            }
        }

        let host_user_id = r.i32()?;
        let game_mode = r.u8()?;
        let scoring_type = r.u8()?;
        let team_type = r.u8()?;
        let free_mods = r.u8()? != 0;
        let mut slot_mods = [0u32; MAX_SLOTS];
        if free_mods {
            for m in slot_mods.iter_mut() {
                *m = r.u32()?;
            }
        }
        let seed = r.i32()?;

        let slots = std::array::from_fn(|i| SlotData {
            status: statuses[i],
            team: teams[i],
            user_id: user_ids[i],
            mods: slot_mods[i],
        });

        Ok(MatchData {
            match_id,
            in_progress,
            match_type,
            mods,
            name,
            password,
            beatmap_name,
            beatmap_id,
            beatmap_md5,
            slots,
            host_user_id,
            game_mode,
            scoring_type,
            team_type,
            free_mods,
            seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MatchData {
        let mut slots: [SlotData; MAX_SLOTS] = std::array::from_fn(|_| SlotData::free());
        slots[0] = SlotData {
            status: SlotStatus::NotReady,
            team: SlotTeam::Red,
            user_id: Some(7),
            mods: 0,
        };
        MatchData {
            match_id: 3,
            in_progress: false,
            match_type: 0,
            mods: 0,
            name: "best match".into(),
            password: "".into(),
            beatmap_name: "song".into(),
            beatmap_id: 42,
            beatmap_md5: "abc123".into(),
            slots,
            host_user_id: 7,
            game_mode: 0,
            scoring_type: 0,
            team_type: 0,
            free_mods: false,
            seed: 0,
        }
    }

    #[test]
    fn round_trips() {
        let m = sample();
        let bytes = m.encode(false);
        let decoded = MatchData::decode(26, &bytes).unwrap();
        assert_eq!(decoded.match_id, 3);
        assert_eq!(decoded.slots[0].user_id, Some(7));
        assert_eq!(decoded.slots[1].status, SlotStatus::Free);
    }

    #[test]
    fn password_is_censored() {
        let mut m = sample();
        m.password = "secret/hash".into();
        let bytes = m.encode(true);
        let decoded = MatchData::decode(26, &bytes).unwrap();
        assert_eq!(decoded.password, "");
    }
}
