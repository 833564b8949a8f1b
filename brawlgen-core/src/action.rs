//! Discrete fighter actions

use serde::{Deserialize, Serialize};

/// Number of discrete actions
pub const ACTION_COUNT: usize = 10;

/// One of the ten commands a controller can issue per frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Action {
    #[default]
    Idle = 0,
    MoveLeft = 1,
    MoveRight = 2,
    Jump = 3,
    Punch = 4,
    Kick = 5,
    Block = 6,
    MoveLeftBlock = 7,
    MoveRightBlock = 8,
    Projectile = 9,
}

/// Returned when an integer does not name an action
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("action index {0} is outside 0..=9")]
pub struct InvalidAction(pub i64);

impl Action {
    /// All actions in index order
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::Idle,
        Action::MoveLeft,
        Action::MoveRight,
        Action::Jump,
        Action::Punch,
        Action::Kick,
        Action::Block,
        Action::MoveLeftBlock,
        Action::MoveRightBlock,
        Action::Projectile,
    ];

    /// Action from its index
    pub fn from_index(index: i64) -> Result<Self, InvalidAction> {
        if (0..ACTION_COUNT as i64).contains(&index) {
            Ok(Self::ALL[index as usize])
        } else {
            Err(InvalidAction(index))
        }
    }

    /// Index of the action (0..=9)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Short name used in prompts and logs
    pub fn name(self) -> &'static str {
        match self {
            Action::Idle => "idle",
            Action::MoveLeft => "move_left",
            Action::MoveRight => "move_right",
            Action::Jump => "jump",
            Action::Punch => "punch",
            Action::Kick => "kick",
            Action::Block => "block",
            Action::MoveLeftBlock => "move_left_block",
            Action::MoveRightBlock => "move_right_block",
            Action::Projectile => "projectile",
        }
    }

    /// True for the three blocking variants
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            Action::Block | Action::MoveLeftBlock | Action::MoveRightBlock
        )
    }

    /// Horizontal direction requested by the action (-1, 0, 1)
    pub fn horizontal(self) -> i8 {
        match self {
            Action::MoveLeft | Action::MoveLeftBlock => -1,
            Action::MoveRight | Action::MoveRightBlock => 1,
            _ => 0,
        }
    }

    /// Same action with left and right swapped
    pub fn mirrored(self) -> Self {
        match self {
            Action::MoveLeft => Action::MoveRight,
            Action::MoveRight => Action::MoveLeft,
            Action::MoveLeftBlock => Action::MoveRightBlock,
            Action::MoveRightBlock => Action::MoveLeftBlock,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index_round_trip() {
        for (i, action) in Action::ALL.iter().enumerate() {
            assert_eq!(Action::from_index(i as i64), Ok(*action));
            assert_eq!(action.index() as usize, i);
        }
    }

    #[test]
    fn test_from_index_rejects_out_of_range() {
        assert_eq!(Action::from_index(10), Err(InvalidAction(10)));
        assert_eq!(Action::from_index(-1), Err(InvalidAction(-1)));
        assert_eq!(Action::from_index(42), Err(InvalidAction(42)));
    }

    #[test]
    fn test_mirrored_swaps_directions() {
        assert_eq!(Action::MoveLeft.mirrored(), Action::MoveRight);
        assert_eq!(Action::MoveRightBlock.mirrored(), Action::MoveLeftBlock);
        assert_eq!(Action::Punch.mirrored(), Action::Punch);
    }

    #[test]
    fn test_blocking_variants() {
        assert!(Action::Block.is_blocking());
        assert!(Action::MoveLeftBlock.is_blocking());
        assert!(!Action::Kick.is_blocking());
    }
}
