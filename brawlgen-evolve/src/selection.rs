//! Selection operators for breeding
//!
//! Tournament selection picks parents: sample a few individuals uniformly
//! (with replacement) and keep the fittest. Elitism carries the top of the
//! previous generation forward unchanged.

use rand::Rng;

/// Tournament selection: sample `tournament_size` indices, return the fittest.
///
/// Returns `None` for an empty population. A tournament size of zero is
/// treated as one (uniform selection).
pub fn tournament_select<R: Rng>(fitness: &[f32], tournament_size: usize, rng: &mut R) -> Option<usize> {
    if fitness.is_empty() {
        return None;
    }

    let mut best_idx = rng.gen_range(0..fitness.len());
    let mut best_fitness = fitness[best_idx];

    for _ in 1..tournament_size.max(1) {
        let idx = rng.gen_range(0..fitness.len());
        if fitness[idx] > best_fitness {
            best_idx = idx;
            best_fitness = fitness[idx];
        }
    }

    Some(best_idx)
}

/// Select `count` parents, avoiding repeats while the population allows it.
///
/// Each parent is drawn by tournament; a draw that repeats an earlier pick
/// is redrawn uniformly a few times, then replaced by the fittest unpicked
/// individual.
pub fn select_parents<R: Rng>(
    fitness: &[f32],
    count: usize,
    tournament_size: usize,
    rng: &mut R,
) -> Vec<usize> {
    const RETRIES: usize = 8;

    let mut parents: Vec<usize> = Vec::with_capacity(count);
    for _ in 0..count {
        let mut pick = match tournament_select(fitness, tournament_size, rng) {
            Some(idx) => idx,
            None => return parents,
        };
        if parents.len() < fitness.len() {
            for _ in 0..RETRIES {
                if !parents.contains(&pick) {
                    break;
                }
                pick = rng.gen_range(0..fitness.len());
            }
            if parents.contains(&pick) {
                // Fittest individual not yet picked
                if let Some(&unused) = select_elite(fitness, fitness.len())
                    .iter()
                    .find(|i| !parents.contains(i))
                {
                    pick = unused;
                }
            }
        }
        parents.push(pick);
    }
    parents
}

/// Select the top N individuals by fitness (elitism).
///
/// Returns indices sorted by fitness descending; ties keep population order.
pub fn select_elite(fitness: &[f32], n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..fitness.len()).collect();
    indices.sort_by(|&a, &b| fitness[b].total_cmp(&fitness[a]));
    indices.truncate(n);
    indices
}
