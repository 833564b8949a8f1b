//! Mirrored per-player state vector
//!
//! Layout (26 floats, "self" always canonically on the left):
//! - 0..=10  own fighter block
//! - 11..=21 opponent fighter block
//! - 22 relative distance, 23 signed relative position,
//!   24 vertical delta, 25 health advantage

use serde::{Deserialize, Serialize};

/// Length of the state vector
pub const STATE_LEN: usize = 26;

/// Floats per fighter block
pub const FIGHTER_BLOCK: usize = 11;

/// Offset of the own fighter block
pub const SELF_OFFSET: usize = 0;

/// Offset of the opponent fighter block
pub const OPPONENT_OFFSET: usize = 11;

// Field offsets inside a fighter block
pub const F_X: usize = 0;
pub const F_Y: usize = 1;
pub const F_VX: usize = 2;
pub const F_VY: usize = 3;
pub const F_HEALTH: usize = 4;
pub const F_BLOCKING: usize = 5;
pub const F_STUN: usize = 6;
pub const F_PUNCH_CD: usize = 7;
pub const F_KICK_CD: usize = 8;
pub const F_PROJECTILE_CD: usize = 9;
pub const F_CHARGE: usize = 10;

// Relational features
pub const REL_DISTANCE: usize = 22;
pub const REL_POSITION: usize = 23;
pub const REL_VERTICAL: usize = 24;
pub const REL_HEALTH: usize = 25;

/// One player's view of the match
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateVector(pub [f32; STATE_LEN]);

impl Default for StateVector {
    fn default() -> Self {
        Self::zeros()
    }
}

impl StateVector {
    /// All-zero state (used for admission smoke calls)
    pub fn zeros() -> Self {
        Self([0.0; STATE_LEN])
    }

    /// Raw values
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Own fighter field
    pub fn own(&self, field: usize) -> f32 {
        self.0[SELF_OFFSET + field]
    }

    /// Opponent fighter field
    pub fn opponent(&self, field: usize) -> f32 {
        self.0[OPPONENT_OFFSET + field]
    }

    /// Normalized horizontal distance between fighters
    pub fn distance(&self) -> f32 {
        self.0[REL_DISTANCE]
    }

    /// Own health minus opponent health, normalized
    pub fn health_advantage(&self) -> f32 {
        self.0[REL_HEALTH]
    }
}

impl From<[f32; STATE_LEN]> for StateVector {
    fn from(values: [f32; STATE_LEN]) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_do_not_overlap_relational_features() {
        assert_eq!(OPPONENT_OFFSET + FIGHTER_BLOCK, REL_DISTANCE);
        assert_eq!(REL_HEALTH + 1, STATE_LEN);
    }

    #[test]
    fn test_accessors() {
        let mut values = [0.0; STATE_LEN];
        values[F_HEALTH] = 0.8;
        values[OPPONENT_OFFSET + F_HEALTH] = 0.5;
        values[REL_DISTANCE] = 0.25;
        values[REL_HEALTH] = 0.3;
        let state = StateVector::from(values);

        assert_eq!(state.own(F_HEALTH), 0.8);
        assert_eq!(state.opponent(F_HEALTH), 0.5);
        assert_eq!(state.distance(), 0.25);
        assert_eq!(state.health_advantage(), 0.3);
    }

    #[test]
    fn test_serde_round_trip() {
        let state = StateVector::zeros();
        let json = serde_json::to_string(&state).unwrap();
        let back: StateVector = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
