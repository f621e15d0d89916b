//! # World List
//!
//! Static country and world tables served to the client's world selector.
//!
//! The raw table is encoded once when a [`WorldList`] is built and its CRC32 kept alongside
//! it. A fetch carrying that same checksum gets only the live player counts; any other value
//! gets the full table followed by the checksum.

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};

pub const FLAG_MEMBERS: u32 = 0x1;
pub const FLAG_QUICKCHAT: u32 = 0x2;
pub const FLAG_PVP: u32 = 0x4;
pub const FLAG_LOOTSHARE: u32 = 0x8;
pub const FLAG_HIGHLIGHT: u32 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub flag: u16,
    pub name: String,
}

impl Country {
    pub fn new(flag: u16, name: &str) -> Self {
        Self {
            flag,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    pub id: u16,
    pub host: String,
    pub country: u8,
    /// Shown instead of the country name when non-empty.
    pub activity: String,
    pub members: bool,
    pub quickchat: bool,
    pub pvp: bool,
    pub lootshare: bool,
    /// Only honoured together with an activity.
    pub highlight: bool,
    pub players: u16,
}

impl World {
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.members {
            flags |= FLAG_MEMBERS;
        }
        if self.quickchat {
            flags |= FLAG_QUICKCHAT;
        }
        if self.pvp {
            flags |= FLAG_PVP;
        }
        if self.lootshare {
            flags |= FLAG_LOOTSHARE;
        }
        if self.highlight && !self.activity.is_empty() {
            flags |= FLAG_HIGHLIGHT;
        }
        flags
    }
}

/// Encoded world table plus its precomputed checksum.
#[derive(Debug, Clone)]
pub struct WorldList {
    worlds: Vec<World>,
    min_id: u16,
    raw: Vec<u8>,
    checksum: u32,
}

impl WorldList {
    pub fn new(countries: Vec<Country>, worlds: Vec<World>) -> Result<Self> {
        let min_id = worlds.iter().map(|w| w.id).min().unwrap_or(0);
        let max_id = worlds.iter().map(|w| w.id).max().unwrap_or(0);

        let mut raw = Packet::new();
        raw.write_smart(smart_count(countries.len())?)?;
        for country in &countries {
            raw.write_smart(country.flag)?;
            raw.write_versioned_str(&country.name)?;
        }

        raw.write_smart(min_id)?;
        raw.write_smart(max_id)?;
        raw.write_smart(smart_count(worlds.len())?)?;
        for world in &worlds {
            raw.write_smart(world.id - min_id)?;
            raw.write_u8(world.country);
            raw.write_u32(world.flags());
            raw.write_versioned_str(&world.activity)?;
            raw.write_versioned_str(&world.host)?;
        }

        let raw = raw.into_inner();
        let checksum = crc32fast::hash(&raw);

        Ok(Self {
            worlds,
            min_id,
            raw,
            checksum,
        })
    }

    /// The default country table and the two local worlds.
    pub fn builtin() -> Result<Self> {
        Self::new(default_countries(), default_worlds())
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn set_players(&mut self, world_id: u16, players: u16) -> bool {
        match self.worlds.iter_mut().find(|w| w.id == world_id) {
            Some(world) => {
                world.players = players;
                true
            }
            None => false,
        }
    }

    /// Body sent after the success byte of a world-list fetch.
    pub fn encode_response(&self, client_checksum: u32) -> Result<Vec<u8>> {
        let mut response = Packet::with_capacity(self.raw.len() + 16);
        response.write_u16(0);
        let start = response.len();

        response.write_bool(true);
        if client_checksum != self.checksum {
            response.write_bool(true);
            response.write_bytes(&self.raw);
            response.write_u32(self.checksum);
        } else {
            response.write_bool(false);
        }

        for world in &self.worlds {
            response.write_smart(world.id - self.min_id)?;
            response.write_u16(world.players);
        }

        response.patch_size_u16(response.len() - start)?;
        Ok(response.into_inner())
    }
}

fn smart_count(count: usize) -> Result<u16> {
    u16::try_from(count)
        .ok()
        .filter(|c| *c <= crate::core::packet::SMART_MAX)
        .ok_or_else(|| ProtocolError::ConfigError(format!("Too many world list entries: {count}")))
}

pub fn default_countries() -> Vec<Country> {
    [
        (0, "United States"),
        (15, "Austria"),
        (16, "Australia"),
        (22, "Germany"),
        (31, "Brazil"),
        (38, "Canada"),
        (43, "Switzerland"),
        (48, "China"),
        (58, "Denmark"),
        (69, "Finland"),
        (74, "France"),
        (77, "United Kingdom"),
        (101, "Ireland"),
        (103, "India"),
        (152, "Mexico"),
        (161, "Netherlands"),
        (162, "Norway"),
        (166, "New Zealand"),
        (179, "Portugal"),
        (191, "Sweden"),
    ]
    .into_iter()
    .map(|(flag, name)| Country::new(flag, name))
    .collect()
}

pub fn default_worlds() -> Vec<World> {
    vec![
        World {
            id: 1,
            host: "localhost".to_string(),
            country: 6,
            activity: String::new(),
            members: true,
            quickchat: false,
            pvp: false,
            lootshare: true,
            highlight: false,
            players: 5,
        },
        World {
            id: 2,
            host: "localhost".to_string(),
            country: 6,
            activity: "Activity Name".to_string(),
            members: false,
            quickchat: false,
            pvp: false,
            lootshare: true,
            highlight: true,
            players: 5,
        },
    ]
}
