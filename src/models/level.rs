//! Administrative address levels used by the KEPCO address service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the six levels of a Korean administrative address, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AddressLevel {
    /// 시/도 (addr_do)
    Province,
    /// 시 (addr_si)
    City,
    /// 구/군 (addr_gu)
    District,
    /// 동/면 (addr_lidong)
    Town,
    /// 리 (addr_li)
    Village,
    /// 상세번지 (addr_jibun)
    Lot,
}

impl AddressLevel {
    /// Number of levels in the hierarchy
    pub const COUNT: usize = 6;

    /// Get all levels in resolution order (province first)
    pub fn all() -> &'static [AddressLevel] {
        &[
            AddressLevel::Province,
            AddressLevel::City,
            AddressLevel::District,
            AddressLevel::Town,
            AddressLevel::Village,
            AddressLevel::Lot,
        ]
    }

    /// Position in the resolution order
    pub fn index(&self) -> usize {
        match self {
            AddressLevel::Province => 0,
            AddressLevel::City => 1,
            AddressLevel::District => 2,
            AddressLevel::Town => 3,
            AddressLevel::Village => 4,
            AddressLevel::Lot => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::all().get(index).copied()
    }

    /// The level after this one, if any
    pub fn next(&self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Levels strictly before this one
    pub fn ancestors(&self) -> &'static [AddressLevel] {
        &Self::all()[..self.index()]
    }

    /// Level discriminator (`gbn`) sent to `retrieveAddrGbn`.
    /// Provinces come from `retrieveAddrInit` and have none.
    pub fn gbn(&self) -> Option<u8> {
        match self {
            AddressLevel::Province => None,
            AddressLevel::City => Some(0),
            AddressLevel::District => Some(1),
            AddressLevel::Town => Some(2),
            AddressLevel::Village => Some(3),
            AddressLevel::Lot => Some(4),
        }
    }

    /// Request parameter key for this level
    pub fn param_key(&self) -> &'static str {
        match self {
            AddressLevel::Province => "addr_do",
            AddressLevel::City => "addr_si",
            AddressLevel::District => "addr_gu",
            AddressLevel::Town => "addr_lidong",
            AddressLevel::Village => "addr_li",
            AddressLevel::Lot => "addr_jibun",
        }
    }

    /// Response row field holding this level's value
    pub fn response_field(&self) -> &'static str {
        match self {
            AddressLevel::Province => "ADDR_DO",
            AddressLevel::City => "ADDR_SI",
            AddressLevel::District => "ADDR_GU",
            AddressLevel::Town => "ADDR_LIDONG",
            AddressLevel::Village => "ADDR_LI",
            AddressLevel::Lot => "ADDR_JIBUN",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AddressLevel::Province => "시/도",
            AddressLevel::City => "시",
            AddressLevel::District => "구/군",
            AddressLevel::Town => "동/면",
            AddressLevel::Village => "리",
            AddressLevel::Lot => "상세번지",
        }
    }

    /// Text a dropdown shows while nothing is chosen
    pub fn placeholder(&self) -> &'static str {
        match self {
            AddressLevel::Province => "시/도 선택",
            AddressLevel::City => "시 선택",
            AddressLevel::District => "구/군 선택",
            AddressLevel::Town => "동/면 선택",
            AddressLevel::Village => "리 선택",
            AddressLevel::Lot => "상세번지 선택",
        }
    }

    /// Whether this is the last level of the hierarchy
    pub fn is_terminal(&self) -> bool {
        matches!(self, AddressLevel::Lot)
    }

    fn name(&self) -> &'static str {
        match self {
            AddressLevel::Province => "province",
            AddressLevel::City => "city",
            AddressLevel::District => "district",
            AddressLevel::Town => "town",
            AddressLevel::Village => "village",
            AddressLevel::Lot => "lot",
        }
    }
}

impl fmt::Display for AddressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AddressLevel {
    type Err = String;

    /// Accepts the English level name or the request parameter key
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        AddressLevel::all()
            .iter()
            .find(|level| level.name() == s || level.param_key() == s)
            .copied()
            .ok_or_else(|| format!("unknown address level: {}", s))
    }
}
