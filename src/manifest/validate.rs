use std::collections::HashMap;
use std::fmt;

use super::platform::TargetPlatform;
use super::{Manifest, ManifestEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    /// A non-blank, non-comment line that is not a requirement specifier.
    Unparseable { line: usize, text: String, reason: String },
    /// No conditional entry of the package applies on these platforms.
    Gap { package: String, platforms: Vec<String> },
    /// More than one entry of the package applies on these platforms.
    Overlap { package: String, lines: Vec<usize>, platforms: Vec<String> },
    /// Co-applicable entries pin the package to incompatible versions.
    ConflictingPins { package: String, lines: Vec<usize>, platforms: Vec<String> },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = |lines: &[usize]| lines.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ");
        match self {
            Issue::Unparseable { line, text, reason } => {
                write!(f, "line {}: `{}` is not a valid requirement ({})", line, text, reason)
            }
            Issue::Gap { package, platforms } => {
                write!(f, "{}: no entry applies on {}", package, platforms.join(", "))
            }
            Issue::Overlap { package, lines: l, platforms } => write!(
                f,
                "{}: lines {} all apply on {}",
                package,
                lines(l),
                platforms.join(", ")
            ),
            Issue::ConflictingPins { package, lines: l, platforms } => write!(
                f,
                "{}: lines {} declare conflicting versions on {}",
                package,
                lines(l),
                platforms.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub issues: Vec<Issue>,
    pub entries_checked: usize,
    pub platforms: Vec<String>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Packages in first-appearance order with every entry naming them.
fn group_by_package(manifest: &Manifest) -> Vec<(String, Vec<&ManifestEntry>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&ManifestEntry>)> = Vec::new();
    for entry in &manifest.entries {
        let name = entry.requirement.normalized_name();
        match index.get(&name) {
            Some(&i) => groups[i].1.push(entry),
            None => {
                index.insert(name.clone(), groups.len());
                groups.push((name, vec![entry]));
            }
        }
    }
    groups
}

/// Lines of co-applicable entries whose version constraints cannot all hold.
fn conflicting_lines(applicable: &[&ManifestEntry]) -> Option<Vec<usize>> {
    let pinned: Vec<&ManifestEntry> = applicable
        .iter()
        .copied()
        .filter(|e| e.requirement.pin().is_some())
        .collect();
    let first = pinned.first()?;
    let version = first.requirement.pin()?;

    let mut lines: Vec<usize> = applicable
        .iter()
        .filter(|e| e.line != first.line)
        .filter(|e| !e.requirement.specifiers.iter().all(|s| s.contains(version)))
        .map(|e| e.line)
        .collect();

    if lines.is_empty() {
        return None;
    }
    lines.insert(0, first.line);
    lines.sort_unstable();
    Some(lines)
}

/// Merges per-platform findings that concern the same package and lines.
fn push_grouped(issues: &mut Vec<Issue>, issue: Issue) {
    for existing in issues.iter_mut() {
        match (existing, &issue) {
            (Issue::Gap { package: a, platforms }, Issue::Gap { package: b, platforms: new }) if a == b => {
                platforms.extend(new.iter().cloned());
                return;
            }
            (
                Issue::Overlap { package: a, lines: la, platforms },
                Issue::Overlap { package: b, lines: lb, platforms: new },
            )
            | (
                Issue::ConflictingPins { package: a, lines: la, platforms },
                Issue::ConflictingPins { package: b, lines: lb, platforms: new },
            ) if a == b && la == lb => {
                platforms.extend(new.iter().cloned());
                return;
            }
            _ => {}
        }
    }
    issues.push(issue);
}

/// Checks that every line parses, that conditional entries of a package
/// partition the target platforms, and that no co-applicable entries pin
/// the same package to conflicting versions.
pub fn validate(manifest: &Manifest, platforms: &[TargetPlatform]) -> Report {
    let mut issues: Vec<Issue> = manifest
        .invalid
        .iter()
        .map(|line| Issue::Unparseable {
            line: line.line,
            text: line.text.clone(),
            reason: line.reason.clone(),
        })
        .collect();

    for (package, entries) in group_by_package(manifest) {
        let partitioned = entries.len() > 1 && entries.iter().any(|e| e.requirement.is_conditional());

        for platform in platforms {
            let applicable: Vec<&ManifestEntry> =
                entries.iter().copied().filter(|e| e.applies_to(platform)).collect();

            if partitioned {
                match applicable.len() {
                    0 => push_grouped(
                        &mut issues,
                        Issue::Gap {
                            package: package.clone(),
                            platforms: vec![platform.label()],
                        },
                    ),
                    1 => {}
                    _ => push_grouped(
                        &mut issues,
                        Issue::Overlap {
                            package: package.clone(),
                            lines: applicable.iter().map(|e| e.line).collect(),
                            platforms: vec![platform.label()],
                        },
                    ),
                }
            }

            if let Some(lines) = conflicting_lines(&applicable) {
                push_grouped(
                    &mut issues,
                    Issue::ConflictingPins {
                        package: package.clone(),
                        lines,
                        platforms: vec![platform.label()],
                    },
                );
            }
        }
    }

    for issue in &issues {
        log::debug!("Manifest issue: {}", issue);
    }

    Report {
        issues,
        entries_checked: manifest.entries.len(),
        platforms: platforms.iter().map(|p| p.label()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str) -> Report {
        validate(&Manifest::parse(text), &TargetPlatform::defaults())
    }

    #[test]
    fn test_three_way_partition_is_clean() {
        let report = check(
            "protobuf==3.20.2; sys_platform != 'darwin'\n\
             protobuf==3.20.2; sys_platform == 'darwin' and platform_machine != 'arm64'\n\
             protobuf==3.20.3; sys_platform == 'darwin' and platform_machine == 'arm64'\n",
        );
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.entries_checked, 3);
    }

    #[test]
    fn test_gap_is_reported() {
        let report = check(
            "protobuf==3.20.2; sys_platform == 'linux'\n\
             protobuf==3.20.3; sys_platform == 'darwin'\n",
        );
        assert_eq!(
            report.issues,
            vec![Issue::Gap {
                package: "protobuf".to_string(),
                platforms: vec!["win32/AMD64".to_string()],
            }]
        );
    }

    #[test]
    fn test_overlap_is_reported_once_per_line_set() {
        let report = check(
            "protobuf==3.20.2; sys_platform != 'win32'\n\
             protobuf==3.20.2; sys_platform == 'darwin'\n",
        );
        assert_eq!(
            report.issues,
            vec![
                Issue::Gap {
                    package: "protobuf".to_string(),
                    platforms: vec!["win32/AMD64".to_string()],
                },
                Issue::Overlap {
                    package: "protobuf".to_string(),
                    lines: vec![1, 2],
                    platforms: vec!["darwin/x86_64".to_string(), "darwin/arm64".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_conflicting_unconditional_pins() {
        let report = check("urllib3==1.26.6\nrequests\nURLLIB3==2.0.0\n");
        assert_eq!(report.issues.len(), 1);
        match &report.issues[0] {
            Issue::ConflictingPins { package, lines, platforms } => {
                assert_eq!(package, "urllib3");
                assert_eq!(lines, &vec![1, 3]);
                assert_eq!(platforms.len(), 5);
            }
            other => panic!("unexpected issue {:?}", other),
        }
    }

    #[test]
    fn test_pin_against_range() {
        let compatible = check("urllib3==1.26.6\nurllib3<2\n");
        assert!(compatible.issues.iter().all(|i| !matches!(i, Issue::ConflictingPins { .. })));

        let conflicting = check("urllib3==1.26.6\nurllib3>=2\n");
        assert!(matches!(conflicting.issues[0], Issue::ConflictingPins { .. }));
    }

    #[test]
    fn test_different_pins_on_exclusive_branches_are_fine() {
        let report = check(
            "bitsandbytes==0.41.1; sys_platform != 'win32'\n\
             bitsandbytes==0.40.0; sys_platform == 'win32'\n",
        );
        assert!(report.is_clean());
    }

    #[test]
    fn test_single_conditional_entry_needs_no_partition() {
        let report = check("autoawq; sys_platform != 'darwin'\n");
        assert!(report.is_clean());
    }

    #[test]
    fn test_unparseable_line() {
        let report = check("langchain=0.0.267\n");
        assert!(matches!(&report.issues[0], Issue::Unparseable { line: 1, .. }));
        assert!(!report.is_clean());
    }
}
