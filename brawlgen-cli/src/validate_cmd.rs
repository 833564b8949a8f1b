//! Validate command - run admission on an agent file and print the verdict
//!
//! Files written by an experiment also get their `code_hash` checked.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use brawlgen_evolve::{agent_body, verify_agent_file};
use brawlgen_host::{AgentHandle, HostConfig};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Agent source file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print the verdict as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct Verdict {
    admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    /// None when the file carries no record header
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_matches: Option<bool>,
}

impl Verdict {
    fn passed(&self) -> bool {
        self.admitted && self.hash_matches != Some(false)
    }
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read agent: {}", args.file.display()))?;
    let verdict = judge(&text, &HostConfig::default());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict, &args);
    }

    if !verdict.passed() {
        bail!("{} failed validation", args.file.display());
    }
    Ok(())
}

fn judge(text: &str, host: &HostConfig) -> Verdict {
    let hash_matches = verify_agent_file(text).ok();
    match AgentHandle::admit("candidate", agent_body(text), host) {
        Ok(handle) => Verdict {
            admitted: true,
            kind: None,
            reason: None,
            digest: Some(handle.digest().to_string()),
            hash_matches,
        },
        Err(err) => Verdict {
            admitted: false,
            kind: Some(err.kind()),
            reason: Some(err.to_string()),
            digest: None,
            hash_matches,
        },
    }
}

fn print_verdict(verdict: &Verdict, args: &ValidateArgs) {
    match (&verdict.digest, verdict.kind, &verdict.reason) {
        (Some(digest), _, _) => println!("{}: admitted (digest {})", args.file.display(), digest),
        (None, Some(kind), Some(reason)) => println!("{}: rejected [{}] {}", args.file.display(), kind, reason),
        _ => println!("{}: rejected", args.file.display()),
    }
    match verdict.hash_matches {
        Some(true) => println!("code_hash: ok"),
        Some(false) => println!("code_hash: MISMATCH (body edited after it was written)"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_source_admitted() {
        let verdict = judge("def act(state):\n    return 1\n", &HostConfig::default());
        assert!(verdict.admitted);
        assert!(verdict.passed());
        assert_eq!(verdict.hash_matches, None);
        assert_eq!(verdict.digest.as_ref().map(String::len), Some(16));
    }

    #[test]
    fn test_rejection_kind_reported() {
        let verdict = judge("def act(state):\n    return eval(1)\n", &HostConfig::default());
        assert!(!verdict.passed());
        assert_eq!(verdict.kind, Some("forbidden_op"));
    }

    #[test]
    fn test_missing_entrypoint() {
        let verdict = judge("x = 1\n", &HostConfig::default());
        assert_eq!(verdict.kind, Some("missing_entrypoint"));
    }
}
