//! Source normalization and content digests

use sha2::{Digest, Sha256};

/// Length of the truncated hex digest
pub const DIGEST_LEN: usize = 16;

/// Normalize proposed source text.
///
/// Strips every nested outer code fence pair, trims surrounding whitespace,
/// normalizes line endings and collapses blank-line runs to at most two.
/// Idempotent.
pub fn clean_source(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    // Peel nested fences too
    let mut unfenced = normalized.trim();
    loop {
        let inner = strip_fence(unfenced).trim();
        if inner.len() == unfenced.len() {
            break;
        }
        unfenced = inner;
    }

    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = 0;
    for line in unfenced.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
            lines.push("");
        } else {
            blank_run = 0;
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn strip_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    let Some(open_end) = text.find('\n') else {
        return text;
    };
    let body = &text[open_end + 1..];
    match body.trim_end().strip_suffix("```") {
        Some(inner) => inner,
        None => text,
    }
}

/// First 16 hex characters of the SHA-256 of the cleaned text
pub fn source_digest(cleaned: &str) -> String {
    let hash = Sha256::digest(cleaned.as_bytes());
    let mut hex = format!("{:x}", hash);
    hex.truncate(DIGEST_LEN);
    hex
}

/// Seed for an agent's private RNG, derived from its digest
pub fn seed_from_digest(digest: &str) -> u64 {
    u64::from_str_radix(digest, 16).unwrap_or_else(|_| {
        digest
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    })
}
