use core::fmt;

use crate::policy::Tactic;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotError {
    EmptyMap,
    RowCountMismatch { declared: usize, actual: usize },
    RaggedRow { row: usize, expected: usize, actual: usize },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMap => write!(f, "map has no cells"),
            Self::RowCountMismatch { declared, actual } => {
                write!(f, "map declares {declared} rows but carries {actual}")
            }
            Self::RaggedRow {
                row,
                expected,
                actual,
            } => write!(f, "row {row} has {actual} cells, expected {expected}"),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandParseError {
    Empty,
    UnknownCode(char),
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "command is empty"),
            Self::UnknownCode(code) => write!(f, "unknown command code {code:?}"),
        }
    }
}

impl std::error::Error for CommandParseError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LadderError {
    Empty,
    InFlightNotFirst,
    Duplicate(Tactic),
}

impl fmt::Display for LadderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "decision ladder has no tactics"),
            Self::InFlightNotFirst => {
                write!(f, "in-flight suppression must be the first tactic")
            }
            Self::Duplicate(tactic) => write!(f, "tactic {tactic} appears twice"),
        }
    }
}

impl std::error::Error for LadderError {}
