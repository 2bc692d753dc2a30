pub mod agent;
pub mod command;
pub mod constants;
pub mod cooldown;
pub mod error;
pub mod grid;
pub mod hazard;
pub mod policy;
pub mod search;
pub mod snapshot;
pub mod tracker;

pub use agent::{AgentContext, AgentState, SkipReason, TickOutput, Trace};
pub use command::{Command, SideRequest, Step};
pub use error::{CommandParseError, LadderError, SnapshotError};
pub use grid::{Direction, Grid, Position, TileKind};
pub use hazard::{blast_footprint, ArrivalEstimate, BombLedger, Footprint, HazardIndex};
pub use policy::{Action, Decision, Ladder, PolicyConfig, Tactic};
pub use search::{FrontierSearch, Route, SearchNode, SearchTree, Visit};
pub use snapshot::{BombRecord, DriveAck, DroppedItem, EventTag, PlayerRecord, TickSnapshot};
pub use tracker::{Plan, PlanTracker, TrackerState};
