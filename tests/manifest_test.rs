use rust_doc_qa::manifest::{validate, Issue, Manifest, TargetPlatform};
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/requirements.txt")
}

#[test]
fn test_fixture_is_clean_on_default_platforms() {
    let manifest = Manifest::from_path(fixture()).unwrap();
    let report = validate(&manifest, &TargetPlatform::defaults());
    assert!(report.is_clean(), "unexpected issues: {:?}", report.issues);
    assert_eq!(report.entries_checked, 28);
    assert_eq!(report.platforms.len(), 5);
}

#[test]
fn test_fixture_sections() {
    let manifest = Manifest::from_path(fixture()).unwrap();
    assert_eq!(
        manifest.sections,
        vec![
            "Natural Language Processing",
            "Utilities",
            "Streamlit related",
            "Excel File Manipulation"
        ]
    );
    assert_eq!(manifest.section_entries("Streamlit related").count(), 3);
    assert_eq!(manifest.section_entries("Excel File Manipulation").count(), 1);
}

#[test]
fn test_protobuf_resolves_once_per_platform() {
    let manifest = Manifest::from_path(fixture()).unwrap();
    for platform in TargetPlatform::defaults() {
        let pins: Vec<String> = manifest
            .applicable(&platform)
            .filter(|e| e.requirement.name == "protobuf")
            .filter_map(|e| e.requirement.pin().map(|v| v.to_string()))
            .collect();
        assert_eq!(pins.len(), 1, "protobuf on {}", platform.label());
    }

    let arm: TargetPlatform = "darwin/arm64".parse().unwrap();
    let pin = manifest
        .applicable(&arm)
        .find(|e| e.requirement.name == "protobuf")
        .and_then(|e| e.requirement.pin().map(|v| v.to_string()));
    assert_eq!(pin.as_deref(), Some("3.20.3"));
}

#[test]
fn test_windows_gets_its_own_bitsandbytes() {
    let manifest = Manifest::from_path(fixture()).unwrap();
    let windows: TargetPlatform = "win32/AMD64".parse().unwrap();
    let names: Vec<&str> = manifest
        .applicable(&windows)
        .map(|e| e.requirement.name.as_str())
        .filter(|name| name.starts_with("bitsandbytes"))
        .collect();
    assert_eq!(names, vec!["bitsandbytes-windows"]);
}

#[test]
fn test_broken_partition_is_reported() {
    let text = std::fs::read_to_string(fixture())
        .unwrap()
        .replace("protobuf==3.20.3; sys_platform == 'darwin' and platform_machine == 'arm64'\n", "")
        .replace("urllib3==1.26.6", "urllib3==1.26.6\nurllib3==2.0.4\nnot a requirement at all");
    let report = validate(&Manifest::parse(&text), &TargetPlatform::defaults());

    assert!(report.issues.iter().any(|issue| matches!(
        issue,
        Issue::Gap { package, platforms } if package == "protobuf" && platforms == &vec!["darwin/arm64".to_string()]
    )));
    assert!(report
        .issues
        .iter()
        .any(|issue| matches!(issue, Issue::ConflictingPins { package, .. } if package == "urllib3")));
    assert!(report
        .issues
        .iter()
        .any(|issue| matches!(issue, Issue::Unparseable { text, .. } if text == "not a requirement at all")));
}
