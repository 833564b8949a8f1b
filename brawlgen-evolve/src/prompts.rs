//! Prompt assembly for the proposal oracle
//!
//! Replaces structural mutation and crossover operators: variation is
//! requested from the oracle in natural language. Every prompt carries the
//! agent contract, a `Style:` line and a `Generation:` line; bred prompts
//! also carry the parent source(s) and their scores.

use std::fmt::Write;

/// Fighting styles handed out to seed slots
pub const DEFAULT_STYLES: [&str; 6] = [
    "aggressive",
    "defensive",
    "balanced",
    "projectile_zoner",
    "counter_attacker",
    "evasive",
];

/// Prefix of the line naming the requested style
pub const STYLE_LINE: &str = "Style: ";

/// Prefix of the line naming the generation
pub const GENERATION_LINE: &str = "Generation: ";

const CONTRACT: &str = "\
Write a controller for a two-player 2D fighting game.

Contract:
- Define `def act(state):` returning an integer action in 0..9.
- Actions: 0 idle, 1 move_left, 2 move_right, 3 jump, 4 punch, 5 kick,
  6 block, 7 move_left_block, 8 move_right_block, 9 projectile.
- `state` is a list of 26 floats, mirrored so you are always on the left
  (move_right approaches the opponent):
  0..10 your fighter: x, y, vx, vy, health, blocking, stun, punch_cooldown,
        kick_cooldown, projectile_cooldown, charge
  11..21 the opponent, same layout
  22 distance, 23 signed relative position, 24 vertical delta,
  25 health advantage (yours minus theirs)
- Only `import math` and `import random` are available. No file, network or
  introspection access. Module-level variables persist between calls.
- Each call must finish within a few milliseconds. Invalid returns and
  exceptions count as idle and repeated faults disable the agent.

Reply with a single ```python code block and nothing else.";

/// Short description of a style tag
pub fn style_brief(style: &str) -> &'static str {
    match style {
        "aggressive" => "close distance fast and keep attacking; trade hits when ahead",
        "defensive" => "block on threat, punish whiffed attacks, never overextend",
        "balanced" => "mix approach, attack and defence based on the health advantage",
        "projectile_zoner" => "hold range, fire projectiles when charged, retreat when approached",
        "counter_attacker" => "wait for the opponent's cooldowns, then strike inside the gap",
        "evasive" => "stay mobile, jump over projectiles, strike only on clear openings",
        _ => "play to win; pick whatever approach beats the field",
    }
}

/// A parent handed to a bred prompt
#[derive(Clone, Debug)]
pub struct ParentBrief<'a> {
    pub id: &'a str,
    pub source: &'a str,
    pub fitness: f32,
    pub win_rate: f32,
}

fn header(out: &mut String, style: &str, generation: u32) {
    out.push_str(CONTRACT);
    out.push_str("\n\n");
    let _ = writeln!(out, "{}{}", STYLE_LINE, style);
    let _ = writeln!(out, "{}{}", GENERATION_LINE, generation);
    let _ = writeln!(out, "Style guidance: {}", style_brief(style));
}

fn parent_block(out: &mut String, label: &str, parent: &ParentBrief<'_>) {
    let _ = writeln!(
        out,
        "\n{} `{}` (fitness {:.2}, win rate {:.0}%):\n```python\n{}\n```",
        label,
        parent.id,
        parent.fitness,
        parent.win_rate * 100.0,
        parent.source
    );
}

/// Prompt for a fresh agent (generation 0)
pub fn seed_prompt(style: &str, generation: u32) -> String {
    let mut out = String::new();
    header(&mut out, style, generation);
    out.push_str("\nWrite a new controller from scratch in this style.\n");
    out
}

/// Prompt asking for a variation of one parent
pub fn mutation_prompt(style: &str, generation: u32, parent: &ParentBrief<'_>) -> String {
    let mut out = String::new();
    header(&mut out, style, generation);
    parent_block(&mut out, "Parent", parent);
    out.push_str(
        "\nImprove this controller. Keep what works, change thresholds or \
         tactics that lose games, and stay within the style.\n",
    );
    out
}

/// Prompt asking for a child combining two parents
pub fn crossover_prompt(
    style: &str,
    generation: u32,
    a: &ParentBrief<'_>,
    b: &ParentBrief<'_>,
) -> String {
    let mut out = String::new();
    header(&mut out, style, generation);
    parent_block(&mut out, "Parent A", a);
    parent_block(&mut out, "Parent B", b);
    out.push_str(
        "\nCombine the strongest ideas of both parents into one controller. \
         Resolve conflicts in favour of the fitter parent.\n",
    );
    out
}

/// Read the `Style:` line back out of a prompt
pub fn style_of(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(STYLE_LINE))
        .map(str::trim)
}

/// Read the `Generation:` line back out of a prompt
pub fn generation_of(prompt: &str) -> Option<u32> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(GENERATION_LINE))
        .and_then(|g| g.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(id: &'static str) -> ParentBrief<'static> {
        ParentBrief {
            id,
            source: "def act(state):\n    return 4",
            fitness: 12.5,
            win_rate: 0.75,
        }
    }

    #[test]
    fn test_seed_prompt_carries_style_and_generation() {
        let prompt = seed_prompt("evasive", 0);
        assert_eq!(style_of(&prompt), Some("evasive"));
        assert_eq!(generation_of(&prompt), Some(0));
        assert!(prompt.contains("def act(state):"));
        assert!(prompt.contains(style_brief("evasive")));
    }

    #[test]
    fn test_mutation_prompt_includes_parent() {
        let prompt = mutation_prompt("aggressive", 3, &parent("g002_01_iron-fist"));
        assert!(prompt.contains("g002_01_iron-fist"));
        assert!(prompt.contains("return 4"));
        assert!(prompt.contains("12.50"));
        assert!(prompt.contains("75%"));
        assert_eq!(generation_of(&prompt), Some(3));
    }

    #[test]
    fn test_crossover_prompt_includes_both_parents() {
        let prompt = crossover_prompt("balanced", 1, &parent("pa"), &parent("pb"));
        assert!(prompt.contains("Parent A `pa`"));
        assert!(prompt.contains("Parent B `pb`"));
    }

    #[test]
    fn test_unknown_style_has_generic_brief() {
        assert!(!style_brief("mystery").is_empty());
        assert_eq!(style_of("no style here"), None);
    }
}
