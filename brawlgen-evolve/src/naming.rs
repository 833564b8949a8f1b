//! Agent naming - Human-readable identifiers for tracking lineage
//!
//! Agents get memorable two-word handles (e.g. "iron-mantis") derived from
//! their source digest, prefixed with the generation and population slot
//! they were born into: `g003_07_iron-mantis`. The same source always maps
//! to the same words.

// 64 adjectives + 64 nouns = 4096 word pairs
const ADJECTIVES: [&str; 64] = [
    "iron", "swift", "quiet", "wild", "grim", "bold", "sly", "stern",
    "brisk", "keen", "rough", "lean", "deft", "stout", "feral", "calm",
    "crimson", "ashen", "golden", "silver", "amber", "jade", "cobalt", "scarlet",
    "stone", "steel", "brass", "bronze", "granite", "velvet", "hollow", "molten",
    "hidden", "rising", "falling", "restless", "patient", "wary", "reckless", "steady",
    "northern", "eastern", "southern", "western", "inner", "outer", "upper", "lower",
    "first", "last", "lone", "twin", "prime", "spare", "true", "false",
    "thunder", "storm", "ember", "frost", "shadow", "dawn", "dusk", "night",
];

const NOUNS: [&str; 64] = [
    "mantis", "tiger", "crane", "viper", "monkey", "dragon", "badger", "falcon",
    "wolf", "bear", "hawk", "lion", "fox", "owl", "boar", "ram",
    "fist", "palm", "elbow", "knee", "heel", "shin", "guard", "stance",
    "jab", "hook", "sweep", "throw", "parry", "feint", "counter", "rush",
    "monk", "ronin", "brawler", "duelist", "boxer", "wrestler", "champion", "rookie",
    "storm", "flame", "tide", "wind", "river", "cliff", "ridge", "peak",
    "blade", "staff", "chain", "hammer", "anvil", "lantern", "bell", "drum",
    "ember", "spark", "comet", "meteor", "eclipse", "zenith", "echo", "shade",
];

/// Fold a hex digest into a 64-bit value (non-hex input is hashed bytewise)
fn digest_bits(digest: &str) -> u64 {
    u64::from_str_radix(digest, 16).unwrap_or_else(|_| {
        digest
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| (acc ^ b as u64).wrapping_mul(0x100_0000_01b3))
    })
}

/// Two-word name for a source digest
pub fn digest_name(digest: &str) -> String {
    let bits = digest_bits(digest);
    let adj_idx = ((bits >> 6) & 0x3F) as usize;
    let noun_idx = (bits & 0x3F) as usize;
    format!("{}-{}", ADJECTIVES[adj_idx], NOUNS[noun_idx])
}

/// Full agent id: `g{GGG}_{SS}_{adjective}-{noun}`
pub fn agent_id(generation: u32, slot: usize, digest: &str) -> String {
    format!("g{:03}_{:02}_{}", generation, slot, digest_name(digest))
}

/// Generation an id was born into, if it follows the naming scheme
pub fn generation_of(id: &str) -> Option<u32> {
    id.strip_prefix('g')?.split('_').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_deterministic() {
        assert_eq!(digest_name("0123456789abcdef"), digest_name("0123456789abcdef"));
    }

    #[test]
    fn test_name_uses_low_bits() {
        // 0x...000 -> adjective 0, noun 0
        assert_eq!(digest_name("0000000000000000"), "iron-mantis");
        // bits 0..6 = 1, bits 6..12 = 1
        assert_eq!(digest_name("0000000000000041"), "swift-tiger");
    }

    #[test]
    fn test_agent_id_format() {
        let id = agent_id(3, 7, "0000000000000000");
        assert_eq!(id, "g003_07_iron-mantis");
        assert_eq!(generation_of(&id), Some(3));
        assert_eq!(generation_of("rulebot-easy"), None);
    }

    #[test]
    fn test_non_hex_digest_still_named() {
        let name = digest_name("not-a-digest");
        let (adj, noun) = name.split_once('-').expect("two words");
        assert!(ADJECTIVES.contains(&adj));
        assert!(NOUNS.contains(&noun));
    }

    #[test]
    fn test_different_digests_usually_differ() {
        assert_ne!(digest_name("00000000000000ff"), digest_name("0000000000000f00"));
    }
}
