//! Proposal oracles - where candidate agent source comes from
//!
//! The generation controller only sees the [`ProposalOracle`] trait. The
//! HTTP client for a hosted model lives in the CLI crate; this module ships
//! [`SeedLibraryOracle`], an offline oracle that samples parametric
//! controllers per style so experiments can run without network access.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHasher;

use crate::error::OracleError;
use crate::prompts;

/// Source of candidate agent programs
///
/// Implementations do not retry; failed requests are retried by the caller
/// within its attempt budget.
pub trait ProposalOracle: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Return the raw completion for a prompt
    fn propose(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String, OracleError>;
}

/// Pull the first fenced code block out of a completion.
///
/// Text without a fence is returned trimmed; an unterminated fence yields
/// everything after the opening line.
pub fn extract_code_block(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.trim().to_string();
    };
    let after_open = &text[open + 3..];
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => return String::new(),
    };
    match body.find("```") {
        Some(close) => body[..close].trim_end().to_string(),
        None => body.trim_end().to_string(),
    }
}

// ============================================================================
// OFFLINE SEED LIBRARY
// ============================================================================

/// Offline oracle producing style-parameterized controllers.
///
/// The style is read from the prompt's `Style:` line. Every call draws fresh
/// thresholds from a seeded RNG mixed with the prompt, so repeated requests
/// yield distinct (but reproducible) programs. Parent source in bred prompts
/// is not consulted.
#[derive(Debug)]
pub struct SeedLibraryOracle {
    seed: u64,
    calls: AtomicU64,
}

impl SeedLibraryOracle {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of proposals served
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ProposalOracle for SeedLibraryOracle {
    fn name(&self) -> &str {
        "seed-library"
    }

    fn propose(&self, prompt: &str, _model: &str, _max_tokens: u32) -> Result<String, OracleError> {
        let variant = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut hasher = FxHasher::default();
        prompt.hash(&mut hasher);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ hasher.finish() ^ variant.rotate_left(17));

        let style = prompts::style_of(prompt).unwrap_or("balanced");
        let params = StyleParams::sample(&mut rng);
        let source = controller_source(style, variant, &params);
        Ok(format!("Here is a {} controller.\n\n```python\n{}\n```\n", style, source))
    }
}

/// Tunable thresholds shared by every template
#[derive(Clone, Debug)]
struct StyleParams {
    punch_reach: f32,
    kick_reach: f32,
    zone: f32,
    aggression: f32,
}

impl StyleParams {
    fn sample<R: Rng>(rng: &mut R) -> Self {
        let punch_reach = rng.gen_range(0.08..0.115);
        Self {
            punch_reach,
            kick_reach: punch_reach + rng.gen_range(0.01..0.035),
            zone: rng.gen_range(0.2..0.45),
            aggression: rng.gen_range(0.2..0.9),
        }
    }
}

fn controller_source(style: &str, variant: u64, p: &StyleParams) -> String {
    let body = match style {
        "aggressive" => AGGRESSIVE,
        "defensive" => DEFENSIVE,
        "projectile_zoner" => ZONER,
        "counter_attacker" => COUNTER,
        "evasive" => EVASIVE,
        _ => BALANCED,
    };
    format!(
        "# {style} controller, variant {variant}\n\
         import random\n\
         \n\
         REACH = {reach:.4}\n\
         KICK_REACH = {kick:.4}\n\
         ZONE = {zone:.4}\n\
         AGGRESSION = {aggr:.3}\n\
         \n\
         def act(state):\n\
         \x20   dist = state[22]\n\
         \x20   punch_ready = state[7] <= 0\n\
         \x20   kick_ready = state[8] <= 0\n\
         \x20   can_shoot = state[10] >= 1 and state[9] <= 0\n\
         {body}",
        style = style,
        variant = variant,
        reach = p.punch_reach,
        kick = p.kick_reach,
        zone = p.zone,
        aggr = p.aggression,
        body = body,
    )
}

const AGGRESSIVE: &str = "    if dist <= KICK_REACH and kick_ready:
        return 5
    if dist <= REACH and punch_ready:
        return 4
    if dist > REACH:
        return 2
    if random.random() < AGGRESSION:
        return 4
    return 6";

const DEFENSIVE: &str = "    if dist <= REACH and state[18] <= 0:
        return 6
    if dist <= REACH and punch_ready:
        return 4
    if dist <= KICK_REACH and kick_ready:
        return 5
    if dist > ZONE:
        return 8
    return 6";

const BALANCED: &str = "    ahead = state[25] >= 0
    if dist <= KICK_REACH and kick_ready:
        return 5
    if dist <= REACH and punch_ready:
        return 4
    if not ahead and dist <= REACH:
        return 7
    if can_shoot and dist > ZONE:
        return 9
    if dist > REACH:
        return 2
    return 6";

const ZONER: &str = "    if can_shoot:
        return 9
    if dist <= REACH and punch_ready:
        return 4
    if dist < ZONE:
        return 7
    if random.random() < AGGRESSION:
        return 2
    return 0";

const COUNTER: &str = "    opp_busy = state[17] > 0 or state[18] > 0 or state[19] > 0
    if dist <= REACH and opp_busy and punch_ready:
        return 4
    if dist <= KICK_REACH and opp_busy and kick_ready:
        return 5
    if dist <= KICK_REACH:
        return 6
    if dist > ZONE:
        return 8
    return 0";

const EVASIVE: &str = "    if state[20] > 0.9 and dist > KICK_REACH:
        return 3
    if dist <= REACH and punch_ready and random.random() < AGGRESSION:
        return 4
    if dist <= REACH:
        return 1
    if can_shoot:
        return 9
    return 2";
