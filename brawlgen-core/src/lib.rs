//! BRAWLGEN Core - Fighting game engine surface
//!
//! This crate provides the pieces of the match simulator the scheduler consumes:
//! - Discrete actions and the 26-float mirrored state vector
//! - The `Simulator` adapter trait (reset / step / per-player views)
//! - A deterministic reference arena implementing that trait
//! - The `Controller` trait shared by scripted agents and built-in bots
//! - Rule-based ladder opponents

pub mod action;
pub mod arena;
pub mod bots;
pub mod controller;
pub mod simulator;
pub mod state;

// Re-exports for convenient access
pub use action::{Action, InvalidAction, ACTION_COUNT};
pub use arena::{Arena, ArenaFactory};
pub use bots::{Difficulty, RuleBot};
pub use controller::{ConstantController, Controller};
pub use simulator::{Side, Simulator, SimulatorFactory, StepOutcome, Winner, DEFAULT_MAX_STEPS};
pub use state::{StateVector, STATE_LEN};
