#![deny(warnings)]

//! Core domain models and invariants for the quarterly economics game.
//!
//! This crate defines the serializable state a player owns, the policies they
//! submit, game/quarter lifecycle types and the validation that runs before
//! any resolution work.

pub mod cabinet;
pub mod game;
pub mod outcome;
pub mod policy;
pub mod resources;
pub mod validation;

pub use cabinet::{
    focus_effectiveness, Assignment, CabinetAssignment, DiplomatAssignment, EngineerAssignment,
    MageAssignment, MinisterRole, Posting, WarriorAssignment, MAX_FOCUS_PER_MINISTER,
    TOTAL_FOCUS_POINTS,
};
pub use game::{
    Game, GameId, GameSettings, GameStatus, Player, PlayerId, Quarter, QuarterId, QuarterStatus,
    ResolutionMode, ScoringPreset, ScoringWeights, TriggerMode,
};
pub use outcome::{
    EventKind, GameEvent, PlayerOutcome, PlayerSnapshot, QuarterResult, ResolutionInput,
    ScoreBreakdown, SnapshotMetrics, WorldState,
};
pub use policy::{CapitalControls, ImmigrationPolicy, PolicyChoices, QeStance};
pub use resources::{PlayerResources, TARGET_INFLATION};
pub use validation::{validate_cabinet, validate_policies, ValidationError};
