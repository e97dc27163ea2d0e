//! `corral plugin verify`.

use std::path::Path;

use anyhow::bail;
use corral_plugins::{MetadataStore, repair, verify};

use crate::theme::Theme;

pub(crate) fn verify_plugins(libexec: &Path, fix: bool) -> anyhow::Result<()> {
    let store = MetadataStore::open(libexec)?;

    if !fix {
        let findings = verify(&store)?;
        if findings.is_empty() {
            println!("{}", Theme::success("Plugin registry is consistent"));
            return Ok(());
        }
        println!("{}", Theme::header("Registry Inconsistencies"));
        for finding in &findings {
            let line = format!("{finding}");
            if finding.is_repairable() {
                println!("  {}", Theme::warning(&line));
            } else {
                println!("  {}", Theme::error(&line));
            }
        }
        println!(
            "\n{}",
            Theme::dimmed("Run `corral plugin verify --repair` to resolve repairable findings")
        );
        bail!("{} inconsistency(ies) found", findings.len());
    }

    println!(
        "{}",
        Theme::dimmed("Repairing; make sure no other corral command is running")
    );
    let outcome = repair(&store)?;
    for finding in &outcome.repaired {
        println!("  {}", Theme::success(&format!("Resolved: {finding}")));
    }
    for finding in &outcome.unresolved {
        println!("  {}", Theme::error(&format!("Needs attention: {finding}")));
    }
    if outcome.unresolved.is_empty() {
        println!(
            "{}",
            Theme::success(&format!(
                "Repair complete, {} finding(s) resolved",
                outcome.repaired.len()
            ))
        );
        Ok(())
    } else {
        bail!(
            "{} finding(s) need a re-install or manual cleanup",
            outcome.unresolved.len()
        )
    }
}
