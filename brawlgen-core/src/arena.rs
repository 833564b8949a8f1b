//! Reference arena - deterministic two-fighter simulation
//!
//! Fighters live in a fixed two-slot array and combat is resolved by slot
//! index. Actions arrive in each player's mirrored frame (own fighter on the
//! left, "right" means toward the opponent) and are translated back to world
//! coordinates before they are applied.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::action::Action;
use crate::simulator::{Side, Simulator, SimulatorFactory, StepOutcome, Winner, DEFAULT_MAX_STEPS};
use crate::state::{self, StateVector, FIGHTER_BLOCK, STATE_LEN};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Arena width in world units
pub const ARENA_WIDTH: f32 = 800.0;

/// Normalization for vertical coordinates
pub const HEIGHT_SCALE: f32 = 200.0;

/// Starting health of each fighter
pub const MAX_HEALTH: f32 = 100.0;

const MOVE_SPEED: f32 = 5.0;
const BLOCK_MOVE_SPEED: f32 = 2.5;
const JUMP_VELOCITY: f32 = 14.0;
const GRAVITY: f32 = 1.0;

/// Fighters start this far apart, plus or minus the jitter
const START_GAP: f32 = 80.0;
const START_JITTER: f32 = 5.0;

/// Grounded fighters cannot walk through each other
const MIN_SEPARATION: f32 = 30.0;

/// Attacks connect only within this vertical difference
const VERTICAL_REACH: f32 = 60.0;

const PROJECTILE_SPEED: f32 = 10.0;
const PROJECTILE_HITBOX: f32 = 20.0;
const CHARGE_PER_FRAME: f32 = 1.0 / 90.0;

/// Damage multiplier while blocking
const BLOCK_FACTOR: f32 = 0.25;

/// Frames of lost control after an unblocked hit
const STUN_FRAMES: u32 = 8;

const DAMAGE_REWARD_SCALE: f32 = 0.1;
const WIN_BONUS: f32 = 5.0;

/// Melee or ranged attack parameters
#[derive(Clone, Copy, Debug)]
pub struct AttackSpec {
    pub range: f32,
    pub damage: f32,
    pub cooldown: u32,
}

pub const PUNCH: AttackSpec = AttackSpec {
    range: 90.0,
    damage: 5.0,
    cooldown: 18,
};

pub const KICK: AttackSpec = AttackSpec {
    range: 115.0,
    damage: 8.0,
    cooldown: 32,
};

pub const PROJECTILE: AttackSpec = AttackSpec {
    range: ARENA_WIDTH,
    damage: 7.0,
    cooldown: 60,
};

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Clone, Debug)]
struct Fighter {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    health: f32,
    blocking: bool,
    stun: u32,
    punch_cd: u32,
    kick_cd: u32,
    projectile_cd: u32,
    charge: f32,
}

impl Fighter {
    fn spawn(x: f32) -> Self {
        Self {
            x,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            health: MAX_HEALTH,
            blocking: false,
            stun: 0,
            punch_cd: 0,
            kick_cd: 0,
            projectile_cd: 0,
            charge: 1.0,
        }
    }

    fn on_ground(&self) -> bool {
        self.y <= 0.0
    }

    fn encode(&self, mirrored: bool) -> [f32; FIGHTER_BLOCK] {
        let x = if mirrored { ARENA_WIDTH - self.x } else { self.x };
        let vx = if mirrored { -self.vx } else { self.vx };
        let mut out = [0.0; FIGHTER_BLOCK];
        out[state::F_X] = x / ARENA_WIDTH;
        out[state::F_Y] = self.y / HEIGHT_SCALE;
        out[state::F_VX] = vx / MOVE_SPEED;
        out[state::F_VY] = self.vy / JUMP_VELOCITY;
        out[state::F_HEALTH] = self.health.max(0.0) / MAX_HEALTH;
        out[state::F_BLOCKING] = if self.blocking { 1.0 } else { 0.0 };
        out[state::F_STUN] = self.stun as f32 / STUN_FRAMES as f32;
        out[state::F_PUNCH_CD] = self.punch_cd as f32 / PUNCH.cooldown as f32;
        out[state::F_KICK_CD] = self.kick_cd as f32 / KICK.cooldown as f32;
        out[state::F_PROJECTILE_CD] = self.projectile_cd as f32 / PROJECTILE.cooldown as f32;
        out[state::F_CHARGE] = self.charge;
        out
    }
}

#[derive(Clone, Copy, Debug)]
struct Projectile {
    x: f32,
    y: f32,
    dir: f32,
}

/// Deterministic reference fighting simulator
pub struct Arena {
    fighters: [Fighter; 2],
    projectiles: [Option<Projectile>; 2],
    frame: u32,
    max_steps: u32,
    done: bool,
    winner: Winner,
    rng: ChaCha8Rng,
}

impl Arena {
    /// Create an arena; the seed drives start-position jitter across games
    pub fn new(seed: u64) -> Self {
        Self::with_max_steps(seed, DEFAULT_MAX_STEPS)
    }

    pub fn with_max_steps(seed: u64, max_steps: u32) -> Self {
        let center = ARENA_WIDTH / 2.0;
        Self {
            fighters: [
                Fighter::spawn(center - START_GAP / 2.0),
                Fighter::spawn(center + START_GAP / 2.0),
            ],
            projectiles: [None, None],
            frame: 0,
            max_steps: max_steps.max(1),
            done: false,
            winner: Winner::Tie,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Current health of a fighter
    pub fn health(&self, side: Side) -> f32 {
        self.fighters[side.index()].health
    }

    /// Frames elapsed in the current game
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// True if `side` is right of its opponent in world coordinates
    fn is_mirrored(&self, i: usize) -> bool {
        self.fighters[i].x > self.fighters[1 - i].x
    }

    /// Apply one fighter's intent; returns melee attack launched this frame
    fn apply_intent(&mut self, i: usize, action: Action) -> Option<AttackSpec> {
        let toward = if self.fighters[1 - i].x >= self.fighters[i].x {
            1.0
        } else {
            -1.0
        };
        let fighter = &mut self.fighters[i];

        if fighter.stun > 0 {
            fighter.stun -= 1;
            fighter.blocking = false;
            fighter.vx = 0.0;
            return None;
        }

        fighter.blocking = action.is_blocking();
        let speed = if fighter.blocking {
            BLOCK_MOVE_SPEED
        } else {
            MOVE_SPEED
        };
        fighter.vx = action.horizontal() as f32 * speed;

        match action {
            Action::Jump if fighter.on_ground() => {
                fighter.vy = JUMP_VELOCITY;
                None
            }
            Action::Punch if fighter.punch_cd == 0 => {
                fighter.punch_cd = PUNCH.cooldown;
                Some(PUNCH)
            }
            Action::Kick if fighter.kick_cd == 0 => {
                fighter.kick_cd = KICK.cooldown;
                Some(KICK)
            }
            Action::Projectile
                if fighter.projectile_cd == 0
                    && fighter.charge >= 1.0
                    && self.projectiles[i].is_none() =>
            {
                fighter.projectile_cd = PROJECTILE.cooldown;
                fighter.charge = 0.0;
                self.projectiles[i] = Some(Projectile {
                    x: fighter.x,
                    y: fighter.y,
                    dir: toward,
                });
                None
            }
            _ => None,
        }
    }

    /// Land a hit from slot `i` on slot `j`; returns damage dealt
    fn land_hit(&mut self, j: usize, damage: f32) -> f32 {
        let target = &mut self.fighters[j];
        let dealt = if target.blocking {
            damage * BLOCK_FACTOR
        } else {
            target.stun = STUN_FRAMES;
            damage
        };
        target.health -= dealt;
        dealt
    }

    fn in_reach(&self, i: usize, spec: &AttackSpec) -> bool {
        let a = &self.fighters[i];
        let b = &self.fighters[1 - i];
        (a.x - b.x).abs() <= spec.range && (a.y - b.y).abs() <= VERTICAL_REACH
    }

    fn integrate(&mut self) {
        let previous = [self.fighters[0].x, self.fighters[1].x];
        for fighter in self.fighters.iter_mut() {
            fighter.x = (fighter.x + fighter.vx).clamp(0.0, ARENA_WIDTH);
            fighter.y += fighter.vy;
            if fighter.y > 0.0 {
                fighter.vy -= GRAVITY;
            } else {
                fighter.y = 0.0;
                fighter.vy = 0.0;
            }
        }

        let both_grounded = self.fighters.iter().all(Fighter::on_ground);
        let crossed = (previous[0] < previous[1]) != (self.fighters[0].x < self.fighters[1].x);
        let gap = (self.fighters[0].x - self.fighters[1].x).abs();
        if both_grounded && (gap < MIN_SEPARATION || crossed) {
            self.fighters[0].x = previous[0];
            self.fighters[1].x = previous[1];
        }
    }

    fn advance_projectiles(&mut self, dealt: &mut [f32; 2]) {
        for owner in 0..2 {
            let Some(mut shot) = self.projectiles[owner] else {
                continue;
            };
            shot.x += shot.dir * PROJECTILE_SPEED;
            let target = &self.fighters[1 - owner];
            let hit = (shot.x - target.x).abs() < PROJECTILE_HITBOX
                && (shot.y - target.y).abs() <= VERTICAL_REACH;

            if hit {
                dealt[owner] += self.land_hit(1 - owner, PROJECTILE.damage);
                self.projectiles[owner] = None;
            } else if !(0.0..=ARENA_WIDTH).contains(&shot.x) {
                self.projectiles[owner] = None;
            } else {
                self.projectiles[owner] = Some(shot);
            }
        }
    }

    fn tick_timers(&mut self) {
        for fighter in self.fighters.iter_mut() {
            fighter.punch_cd = fighter.punch_cd.saturating_sub(1);
            fighter.kick_cd = fighter.kick_cd.saturating_sub(1);
            fighter.projectile_cd = fighter.projectile_cd.saturating_sub(1);
            fighter.charge = (fighter.charge + CHARGE_PER_FRAME).min(1.0);
        }
    }

    fn terminal_outcome(&self) -> StepOutcome {
        StepOutcome {
            state: self.state_for(Side::One),
            r1: 0.0,
            r2: 0.0,
            done: true,
            winner: self.winner,
        }
    }
}

impl Simulator for Arena {
    fn reset(&mut self) -> StateVector {
        let center = ARENA_WIDTH / 2.0;
        let jitter_a = self.rng.gen_range(-START_JITTER..=START_JITTER);
        let jitter_b = self.rng.gen_range(-START_JITTER..=START_JITTER);
        self.fighters = [
            Fighter::spawn(center - START_GAP / 2.0 + jitter_a),
            Fighter::spawn(center + START_GAP / 2.0 + jitter_b),
        ];
        self.projectiles = [None, None];
        self.frame = 0;
        self.done = false;
        self.winner = Winner::Tie;
        self.state_for(Side::One)
    }

    fn step(&mut self, a1: Action, a2: Action) -> StepOutcome {
        if self.done {
            return self.terminal_outcome();
        }
        self.frame += 1;

        // Actions arrive in each player's own frame
        let world = [
            if self.is_mirrored(0) { a1.mirrored() } else { a1 },
            if self.is_mirrored(1) { a2.mirrored() } else { a2 },
        ];

        let attacks = [self.apply_intent(0, world[0]), self.apply_intent(1, world[1])];

        // Melee resolves on pre-movement positions, simultaneously
        let mut dealt = [0.0f32; 2];
        let connects: Vec<(usize, AttackSpec)> = attacks
            .iter()
            .enumerate()
            .filter_map(|(i, attack)| attack.map(|spec| (i, spec)))
            .filter(|(i, spec)| self.in_reach(*i, spec))
            .collect();
        for (i, spec) in connects {
            dealt[i] += self.land_hit(1 - i, spec.damage);
        }

        self.integrate();
        self.advance_projectiles(&mut dealt);
        self.tick_timers();

        let mut r1 = (dealt[0] - dealt[1]) * DAMAGE_REWARD_SCALE;
        let mut r2 = (dealt[1] - dealt[0]) * DAMAGE_REWARD_SCALE;

        let knocked_out = self.fighters.iter().any(|f| f.health <= 0.0);
        if knocked_out || self.frame >= self.max_steps {
            self.done = true;
            self.winner = Winner::from_health(self.fighters[0].health, self.fighters[1].health);
            match self.winner {
                Winner::Player1 => {
                    r1 += WIN_BONUS;
                    r2 -= WIN_BONUS;
                }
                Winner::Player2 => {
                    r1 -= WIN_BONUS;
                    r2 += WIN_BONUS;
                }
                Winner::Tie => {}
            }
        }

        StepOutcome {
            state: self.state_for(Side::One),
            r1,
            r2,
            done: self.done,
            winner: self.winner,
        }
    }

    fn state_for(&self, side: Side) -> StateVector {
        let i = side.index();
        let j = 1 - i;
        let mirrored = self.is_mirrored(i);
        let me = &self.fighters[i];
        let them = &self.fighters[j];

        let mut values = [0.0f32; STATE_LEN];
        values[state::SELF_OFFSET..state::SELF_OFFSET + FIGHTER_BLOCK]
            .copy_from_slice(&me.encode(mirrored));
        values[state::OPPONENT_OFFSET..state::OPPONENT_OFFSET + FIGHTER_BLOCK]
            .copy_from_slice(&them.encode(mirrored));

        let own_x = values[state::SELF_OFFSET + state::F_X];
        let their_x = values[state::OPPONENT_OFFSET + state::F_X];
        values[state::REL_DISTANCE] = (their_x - own_x).abs();
        values[state::REL_POSITION] = their_x - own_x;
        values[state::REL_VERTICAL] = (them.y - me.y) / HEIGHT_SCALE;
        values[state::REL_HEALTH] = (me.health.max(0.0) - them.health.max(0.0)) / MAX_HEALTH;

        StateVector(values)
    }

    fn max_steps(&self) -> u32 {
        self.max_steps
    }
}

/// Factory producing `Arena` instances with a fixed frame cap
#[derive(Clone, Copy, Debug)]
pub struct ArenaFactory {
    pub max_steps: u32,
}

impl Default for ArenaFactory {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl SimulatorFactory for ArenaFactory {
    fn create(&self, seed: u64) -> Box<dyn Simulator> {
        Box::new(Arena::with_max_steps(seed, self.max_steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_out(arena: &mut Arena, a1: Action, a2: Action) -> (f32, f32, Winner, u32) {
        arena.reset();
        let mut totals = (0.0, 0.0);
        loop {
            let out = arena.step(a1, a2);
            totals.0 += out.r1;
            totals.1 += out.r2;
            if out.done {
                return (totals.0, totals.1, out.winner, arena.frame());
            }
        }
    }

    #[test]
    fn test_reset_starts_full_health() {
        let mut arena = Arena::new(7);
        let state = arena.reset();
        assert_eq!(state.own(state::F_HEALTH), 1.0);
        assert_eq!(state.opponent(state::F_HEALTH), 1.0);
        assert!(state.distance() > 0.0);
    }

    #[test]
    fn test_views_are_mirrored() {
        let mut arena = Arena::new(1);
        arena.reset();
        let one = arena.state_for(Side::One);
        let two = arena.state_for(Side::Two);
        // Each player sees the opponent on its right
        assert!(one.0[state::REL_POSITION] > 0.0);
        assert!(two.0[state::REL_POSITION] > 0.0);
        assert!((one.distance() - two.distance()).abs() < 1e-6);
    }

    #[test]
    fn test_punch_beats_idle() {
        let mut arena = Arena::with_max_steps(3, 3600);
        let (r1, r2, winner, frames) = play_out(&mut arena, Action::Punch, Action::Idle);
        assert_eq!(winner, Winner::Player1);
        assert!(r1 > 0.0);
        assert!(r2 < 0.0);
        assert!(frames < 3600, "punching should knock out before the cap");
    }

    #[test]
    fn test_idle_mirror_match_is_tie_at_cap() {
        let mut arena = Arena::with_max_steps(3, 200);
        let (r1, r2, winner, frames) = play_out(&mut arena, Action::Idle, Action::Idle);
        assert_eq!(winner, Winner::Tie);
        assert_eq!(frames, 200);
        assert_eq!(r1, 0.0);
        assert_eq!(r2, 0.0);
    }

    #[test]
    fn test_blocking_reduces_damage() {
        let mut open = Arena::with_max_steps(5, 40);
        play_out(&mut open, Action::Punch, Action::Idle);
        let mut guarded = Arena::with_max_steps(5, 40);
        play_out(&mut guarded, Action::Punch, Action::Block);
        assert!(guarded.health(Side::Two) > open.health(Side::Two));
    }

    #[test]
    fn test_move_right_approaches_for_both_players() {
        let mut arena = Arena::new(11);
        let start = arena.reset().distance();
        let mut last = start;
        for _ in 0..3 {
            last = arena.step(Action::MoveRight, Action::MoveRight).state.distance();
        }
        assert!(last < start);
    }

    #[test]
    fn test_determinism_same_seed() {
        let script = [Action::MoveRight, Action::Punch, Action::Jump, Action::Kick, Action::Projectile];
        let run = |seed: u64| {
            let mut arena = Arena::new(seed);
            let mut trace = vec![arena.reset()];
            for i in 0..200 {
                let out = arena.step(script[i % script.len()], script[(i + 2) % script.len()]);
                trace.push(out.state);
            }
            trace
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn test_step_after_done_is_inert() {
        let mut arena = Arena::with_max_steps(0, 1);
        arena.reset();
        let first = arena.step(Action::Idle, Action::Idle);
        assert!(first.done);
        let again = arena.step(Action::Punch, Action::Punch);
        assert!(again.done);
        assert_eq!(again.r1, 0.0);
    }

    #[test]
    fn test_factory_respects_max_steps() {
        let factory = ArenaFactory { max_steps: 10 };
        let sim = factory.create(1);
        assert_eq!(sim.max_steps(), 10);
    }
}
