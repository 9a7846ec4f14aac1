use colored::Colorize;
use std::path::Path;

use crate::manifest::{validate, Issue, Manifest, ManifestError, Report, TargetPlatform};

/// The given `os/machine` targets (`host` for this machine), or the default
/// platform set when none are given.
pub fn platforms(specs: &[String]) -> Result<Vec<TargetPlatform>, ManifestError> {
    if specs.is_empty() {
        return Ok(TargetPlatform::defaults());
    }
    specs
        .iter()
        .map(|spec| match spec.as_str() {
            "host" => Ok(TargetPlatform::host()),
            spec => spec.parse::<TargetPlatform>(),
        })
        .collect()
}

pub fn check_file(path: &Path, platform_specs: &[String]) -> Result<Report, ManifestError> {
    let manifest = Manifest::from_path(path)?;
    let targets = platforms(platform_specs)?;
    log::info!(
        "Checking {} entries of {} on {} platforms",
        manifest.entries.len(),
        path.display(),
        targets.len()
    );
    Ok(validate(&manifest, &targets))
}

fn issue_label(issue: &Issue) -> colored::ColoredString {
    match issue {
        Issue::Unparseable { .. } => "invalid".red().bold(),
        Issue::Gap { .. } => "gap".yellow().bold(),
        Issue::Overlap { .. } => "overlap".yellow().bold(),
        Issue::ConflictingPins { .. } => "conflict".red().bold(),
    }
}

pub fn print_report(path: &Path, report: &Report) {
    println!(
        "📦 {} ({} entries, platforms: {})",
        path.display().to_string().bright_yellow(),
        report.entries_checked,
        report.platforms.join(", ")
    );
    if report.is_clean() {
        println!("{}", "✅ No issues found".green());
        return;
    }
    for issue in &report.issues {
        println!("  {} {}", issue_label(issue), issue);
    }
    println!("{}", format!("❌ {} issue(s) found", report.issues.len()).red());
}

/// Runs the checks and prints them. Returns whether the manifest is clean.
pub fn check(path: &Path, platform_specs: &[String]) -> Result<bool, ManifestError> {
    let report = check_file(path, platform_specs)?;
    print_report(path, &report);
    Ok(report.is_clean())
}

/// Lists sections and, per target platform, the entries that apply there.
pub fn show(path: &Path, platform_specs: &[String]) -> Result<(), ManifestError> {
    let manifest = Manifest::from_path(path)?;
    let targets = platforms(platform_specs)?;

    println!("📦 {}", path.display().to_string().bright_yellow());
    for section in &manifest.sections {
        let count = manifest.section_entries(section).count();
        println!("  {} ({} entries)", section.cyan(), count);
    }

    for target in &targets {
        println!("\n🖥️  {}", target.label().bold());
        for entry in manifest.applicable(target) {
            println!("  {:>4}  {}", entry.line, entry.requirement);
        }
    }
    Ok(())
}
