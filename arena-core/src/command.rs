//! Outbound commands.
//!
//! A drive command is a string of direction codes, optionally containing drop
//! codes; a halt is the single code `x`. Side-channel requests travel on their
//! own and never occupy a plan slot.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{DROP_DEVICE, HALT};
use crate::error::CommandParseError;
use crate::grid::Direction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    Move(Direction),
    Drop,
}

impl Step {
    pub fn code(self) -> char {
        match self {
            Self::Move(dir) => dir.code(),
            Self::Drop => DROP_DEVICE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Drive(Vec<Step>),
    Halt,
}

impl Command {
    pub fn moves(steps: impl IntoIterator<Item = Direction>) -> Self {
        Self::Drive(steps.into_iter().map(Step::Move).collect())
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt)
    }

    pub fn drops_device(&self) -> bool {
        matches!(self, Self::Drive(steps) if steps.contains(&Step::Drop))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halt => write!(f, "{HALT}"),
            Self::Drive(steps) => {
                for step in steps {
                    write!(f, "{}", step.code())?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(CommandParseError::Empty);
        }
        if raw.len() == 1 && raw.starts_with(HALT) {
            return Ok(Self::Halt);
        }
        raw.chars()
            .map(|code| match code {
                DROP_DEVICE => Ok(Step::Drop),
                other => Direction::from_code(other)
                    .map(Step::Move)
                    .ok_or(CommandParseError::UnknownCode(other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Drive)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideRequest {
    SwitchItem,
    InitiatePairing,
    UseAbility { target: String },
}

impl SideRequest {
    /// Rate-limit bucket; every ability use shares one bucket.
    pub fn kind(&self) -> SideRequestKind {
        match self {
            Self::SwitchItem => SideRequestKind::SwitchItem,
            Self::InitiatePairing => SideRequestKind::InitiatePairing,
            Self::UseAbility { .. } => SideRequestKind::UseAbility,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SideRequestKind {
    SwitchItem,
    InitiatePairing,
    UseAbility,
}
