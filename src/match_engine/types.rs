//! Match/Slot domain model (C7). Kept separate from the wire format in
//! `bancho_proto::match_data` so the lock-protected state can carry fields
//! the wire never sees (e.g. per-slot `loaded`/`skipped`/`completed`).

use bancho_proto::match_data::{MatchData, SlotData, SlotStatus, SlotTeam, MAX_SLOTS};

pub const MOD_NO_FAIL: u32 = 1 << 0;
pub const MOD_HARD_ROCK: u32 = 1 << 4;
pub const MOD_DOUBLE_TIME: u32 = 1 << 6;
pub const MOD_RELAX: u32 = 1 << 7;
pub const MOD_HALF_TIME: u32 = 1 << 8;
pub const MOD_NIGHTCORE: u32 = 1 << 9;

/// Mods that alter song rate; the only bits a match keeps centralized after
/// a FREE_MOD → NORMAL → FREE_MOD round trip.
pub const SPEED_CHANGING: u32 = MOD_DOUBLE_TIME | MOD_HALF_TIME | MOD_NIGHTCORE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModMode {
    Normal,
    FreeMod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamType {
    HeadToHead,
    TagCoop,
    TeamVs,
    TagTeamVs,
}

impl TeamType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::TagCoop,
            2 => Self::TeamVs,
            3 => Self::TagTeamVs,
            _ => Self::HeadToHead,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::HeadToHead => 0,
            Self::TagCoop => 1,
            Self::TeamVs => 2,
            Self::TagTeamVs => 3,
        }
    }

    pub fn is_team_based(self) -> bool {
        matches!(self, Self::TeamVs | Self::TagTeamVs)
    }
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub status: SlotStatus,
    pub team: SlotTeam,
    pub user_id: Option<i32>,
    pub token_id: Option<String>,
    pub mods: u32,
    pub loaded: bool,
    pub skipped: bool,
    pub completed: bool,
    pub failed: bool,
}

impl Slot {
    pub fn free() -> Self {
        Self {
            status: SlotStatus::Free,
            team: SlotTeam::Neutral,
            user_id: None,
            token_id: None,
            mods: 0,
            loaded: false,
            skipped: false,
            completed: false,
            failed: false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.status.has_player()
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub match_id: u16,
    pub name: String,
    pub password: String,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub beatmap_md5: String,
    pub host_user_id: i32,
    pub game_mode: u8,
    pub mods: u32,
    pub scoring_type: u8,
    pub team_type: TeamType,
    pub mod_mode: ModMode,
    pub is_in_progress: bool,
    pub is_tourney: bool,
    pub seed: i32,
    pub slots: [Slot; MAX_SLOTS],
}

impl Match {
    pub fn new(match_id: u16, name: String, password: String, host_user_id: i32, game_mode: u8) -> Self {
        Self {
            match_id,
            name,
            password,
            beatmap_name: String::new(),
            beatmap_id: 0,
            beatmap_md5: String::new(),
            host_user_id,
            game_mode,
            mods: 0,
            scoring_type: 0,
            team_type: TeamType::HeadToHead,
            mod_mode: ModMode::Normal,
            is_in_progress: false,
            is_tourney: false,
            seed: 0,
            slots: std::array::from_fn(|_| Slot::free()),
        }
    }

    pub fn slot_of_user(&self, user_id: i32) -> Option<usize> {
        self.slots.iter().position(|s| s.user_id == Some(user_id))
    }

    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s.status, SlotStatus::Free))
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    pub fn to_wire(&self, censor_password: bool) -> MatchData {
        let slots = std::array::from_fn(|i| SlotData {
            status: self.slots[i].status,
            team: self.slots[i].team,
            user_id: self.slots[i].user_id,
            mods: self.slots[i].mods,
        });
        MatchData {
            match_id: self.match_id,
            in_progress: self.is_in_progress,
            match_type: 0,
            mods: self.mods,
            name: self.name.clone(),
            password: if censor_password { String::new() } else { self.password.clone() },
            beatmap_name: self.beatmap_name.clone(),
            beatmap_id: self.beatmap_id,
            beatmap_md5: self.beatmap_md5.clone(),
            slots,
            host_user_id: self.host_user_id,
            game_mode: self.game_mode,
            scoring_type: self.scoring_type,
            team_type: self.team_type.as_u8(),
            free_mods: matches!(self.mod_mode, ModMode::FreeMod),
            seed: self.seed,
        }
    }
}
