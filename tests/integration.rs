use std::fs;
use std::path::Path;

use shmerge::parse::{self, Command};
use shmerge::resolve::UnresolvedPolicy;
use shmerge::{Config, Error};
use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn order_of(dir: &TempDir, entry: &str) -> Vec<String> {
    let resolution =
        shmerge::resolve_dependencies(&dir.path().join(entry), &Config::default_config().settings).unwrap();
    resolution
        .order
        .iter()
        .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
        .collect()
}

fn bundle(dir: &TempDir, entry: &str) -> String {
    shmerge::bundle(&dir.path().join(entry)).unwrap()
}

fn bundle_err(dir: &TempDir, entry: &str) -> Error {
    shmerge::bundle(&dir.path().join(entry)).unwrap_err()
}

/// Text after the (single) banner block.
fn body(merged: &str) -> &str {
    merged.split_once("-\n\n").unwrap().1
}

fn runs_source(line: &str) -> bool {
    parse::split_statements(line)
        .iter()
        .any(|s| matches!(parse::classify(&s.text), Command::Source { .. }))
}

macro_rules! order_test {
    ($name:ident, $files:expr, $entry:expr, $expected:expr) => {
        #[test]
        fn $name() {
            let dir = project(&$files);
            assert_eq!(order_of(&dir, $entry), $expected);
        }
    };
}

// ── Dependency ordering ──

order_test!(order_single_file, [("main.sh", "echo hi\n")], "main.sh", ["main.sh"]);
order_test!(
    order_diamond,
    [
        ("a.sh", "source b.sh\nsource c.sh\n"),
        ("b.sh", "source d.sh\n"),
        ("c.sh", "source d.sh\n"),
        ("d.sh", "echo d\n"),
    ],
    "a.sh",
    ["d.sh", "b.sh", "c.sh", "a.sh"]
);
order_test!(
    order_chain,
    [
        ("main.sh", ". lib/one.sh\n"),
        ("lib/one.sh", ". \"$(dirname \"${BASH_SOURCE[0]}\")/two.sh\"\n"),
        ("lib/two.sh", "true\n"),
    ],
    "main.sh",
    ["lib/two.sh", "lib/one.sh", "main.sh"]
);
order_test!(
    order_follows_conditionals,
    [
        ("main.sh", "if [ -f cfg.sh ]; then source cfg.sh; fi\n[ -n \"$X\" ] && . extra.sh\n"),
        ("cfg.sh", "X=1\n"),
        ("extra.sh", "Y=2\n"),
    ],
    "main.sh",
    ["cfg.sh", "extra.sh", "main.sh"]
);
order_test!(
    order_ignores_commented_and_quoted,
    [
        ("main.sh", "# source missing.sh\necho \"source missing.sh\"\necho ok # . missing.sh\n"),
    ],
    "main.sh",
    ["main.sh"]
);
order_test!(
    order_script_dir_idiom,
    [
        (
            "bin/run.sh",
            "ROOT=\"$(cd \"$(dirname \"$0\")/..\" && pwd)\"\nsource \"$ROOT/lib/common.sh\"\n"
        ),
        ("lib/common.sh", "log() { echo \"$*\"; }\n"),
    ],
    "bin/run.sh",
    ["lib/common.sh", "bin/run.sh"]
);

// ── Errors ──

#[test]
fn cycle_is_circular_dependency() {
    let dir = project(&[("x.sh", "source y.sh\n"), ("y.sh", "source x.sh\n")]);
    match bundle_err(&dir, "x.sh") {
        Error::CircularDependency { chain, offending } => {
            assert_eq!(chain.first(), Some(&dir.path().join("x.sh")));
            assert!(chain.contains(&offending));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_entry_point() {
    let dir = project(&[]);
    assert!(matches!(bundle_err(&dir, "main.sh"), Error::EntryPointInvalid(_)));
}

#[test]
fn missing_sourced_file() {
    let dir = project(&[("main.sh", "source lib.sh\n")]);
    let err = bundle_err(&dir, "main.sh");
    assert!(matches!(err, Error::FileNotFound { line: 1, .. }), "{err}");
    assert!(err.to_string().contains("lib.sh"));
}

#[test]
fn sourcing_a_directory_is_file_not_found() {
    let dir = project(&[("main.sh", "source lib\n"), ("lib/x.sh", "")]);
    assert!(matches!(bundle_err(&dir, "main.sh"), Error::FileNotFound { .. }));
}

#[test]
fn missing_cd_target() {
    let dir = project(&[("main.sh", "echo\ncd ./gone\n")]);
    assert!(matches!(
        bundle_err(&dir, "main.sh"),
        Error::DirectoryNotFound { line: 2, .. }
    ));
}

#[test]
fn unresolved_policy_decides_missing_references() {
    let dir = project(&[("main.sh", "source \"$SHMERGE_IT_UNSET/lib.sh\"\necho ok\n")]);
    let entry = dir.path().join("main.sh");

    // Kept verbatim: cannot be resolved statically, skipped
    let merged = shmerge::compile_to_string(&entry, &Config::default_config()).unwrap();
    assert!(merged.contains("echo ok"));

    // Expanded to nothing: names /lib.sh, which does not exist
    let mut config = Config::default_config();
    config.settings.unresolved_variables = UnresolvedPolicy::Empty;
    assert!(matches!(
        shmerge::compile_to_string(&entry, &config),
        Err(Error::FileNotFound { .. })
    ));
}

// ── Merged output ──

#[test]
fn set_declarations_are_reconciled() {
    let dir = project(&[
        ("main.sh", "source a.sh\nsource b.sh\nset -o pipefail\necho main\n"),
        ("a.sh", "set -e\n"),
        ("b.sh", "set -u\n"),
    ]);
    let mut config = Config::default_config();
    config.header.strict_mode = String::new();
    let merged = shmerge::compile_to_string(&dir.path().join("main.sh"), &config).unwrap();

    let set_lines: Vec<&str> = merged.lines().filter(|l| l.starts_with("set ")).collect();
    assert_eq!(set_lines, vec!["set -eu -o pipefail"]);
    assert!(merged.starts_with("#!/bin/bash\n\nset -eu -o pipefail\n\n"));
}

#[test]
fn default_header_is_strict_mode() {
    let dir = project(&[("main.sh", "echo hi\n")]);
    assert!(bundle(&dir, "main.sh").starts_with("#!/bin/bash\n\nset -Eeu -o pipefail\n\n"));
}

#[test]
fn no_source_survives() {
    let dir = project(&[
        ("main.sh", "source lib.sh\nload() {\n  . ./lib.sh\n}\nx=$(source lib.sh; echo)\n[ -f lib.sh ] && source lib.sh\n"),
        ("lib.sh", "helper() { :; }\n"),
    ]);
    let merged = bundle(&dir, "main.sh");
    assert!(!merged.lines().any(runs_source), "{merged}");
    assert!(merged.contains("  : ./lib.sh\n"));
    assert!(merged.contains("x=$(: lib.sh; echo)"));
    assert!(merged.contains("[ -f lib.sh ] && : lib.sh"));
}

#[test]
fn files_appear_in_dependency_order_with_banners() {
    let dir = project(&[
        ("main.sh", "source lib/a.sh\necho main\n"),
        ("lib/a.sh", "echo a\n"),
    ]);
    let merged = bundle(&dir, "main.sh");
    let a = merged.find("-lib/a.sh-").unwrap();
    let main = merged.find("-main.sh-").unwrap();
    assert!(a < main);
    assert!(merged.find("echo a").unwrap() < merged.find("echo main").unwrap());
}

#[test]
fn cd_into_project_becomes_noop() {
    let dir = project(&[("main.sh", "cd sub\necho inside\n"), ("sub/.keep", "")]);
    let merged = bundle(&dir, "main.sh");
    assert!(body(&merged).starts_with(":\necho inside\n"), "{merged}");
}

#[test]
fn relative_cd_outside_is_made_absolute() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("proj")).unwrap();
    fs::create_dir_all(root.path().join("outside/dir")).unwrap();
    fs::write(root.path().join("proj/main.sh"), "cd ../outside/dir\necho out\n").unwrap();

    let merged = shmerge::bundle(&root.path().join("proj/main.sh")).unwrap();
    let expected = format!("cd \"{}\"\necho out\n", root.path().join("outside/dir").display());
    assert!(body(&merged).starts_with(&expected), "{merged}");
}

#[test]
fn absolute_cd_outside_is_kept() {
    let dir = project(&[("main.sh", "cd /\necho root\n")]);
    assert!(body(&bundle(&dir, "main.sh")).starts_with("cd /\necho root\n"));
}

#[test]
fn self_reference_rewrite() {
    let dir = project(&[
        (
            "main.sh",
            "DIR=\"$(cd \"$(dirname \"${BASH_SOURCE[0]}\")\" && pwd)\"\nLIB=\"$DIR/lib.sh\"\nsource \"$LIB\"\ngreet\n",
        ),
        ("lib.sh", "greet() { echo hi; }\n"),
    ]);
    let merged = bundle(&dir, "main.sh");
    assert!(merged.contains("LIB=\"${BASH_SOURCE[0]}\"\n"), "{merged}");
    assert!(merged.contains(&format!("DIR=\"{}\"\n", dir.path().display())));
    assert!(!merged.contains("/lib.sh\""));
}

#[test]
fn cd_with_options_is_followed() {
    let dir = project(&[("main.sh", "cd -P sub\ncd -- sub\necho deep\n"), ("sub/sub/.keep", "")]);
    let merged = bundle(&dir, "main.sh");
    assert!(body(&merged).starts_with(":\n:\necho deep\n"), "{merged}");
}

#[test]
fn physical_script_dir_idiom() {
    let dir = project(&[
        (
            "main.sh",
            "ROOT=\"$(cd -P \"$(dirname \"$0\")\" && pwd)\"; source \"$ROOT/lib.sh\"\ngreet\n",
        ),
        ("lib.sh", "greet() { echo hi; }\n"),
    ]);
    assert_eq!(order_of(&dir, "main.sh"), ["lib.sh", "main.sh"]);
    let merged = bundle(&dir, "main.sh");
    assert!(merged.contains("greet() { echo hi; }"), "{merged}");
}

#[test]
fn appended_path_is_rewritten_whole() {
    let dir = project(&[
        ("main.sh", "LIB=\"$(dirname \"$0\")\"\nLIB+=/lib.sh\nsource \"$LIB\"\n"),
        ("lib.sh", "true\n"),
    ]);
    let merged = bundle(&dir, "main.sh");
    assert!(merged.contains("LIB=\"${BASH_SOURCE[0]}\"\n"), "{merged}");
    assert!(!merged.contains("LIB+="), "{merged}");
}

#[test]
fn trivial_input_is_stable() {
    let dir = project(&[(
        "main.sh",
        "#!/bin/bash\n# helper\n\necho one\nfoo() {\n  # inner\n  echo two\n}\n\nfoo\n",
    )]);
    let first = bundle(&dir, "main.sh");

    let rule = format!("#{}", "-".repeat(119));
    let title = format!("#{}main.sh{}", "-".repeat(56), "-".repeat(56));
    let expected = format!(
        "#!/bin/bash\n\nset -Eeu -o pipefail\n\n{rule}\n{title}\n{rule}\n\necho one\nfoo() {{\n  # inner\n  echo two\n}}\nfoo\n\n"
    );
    assert_eq!(first, expected);

    let again = project(&[("main.sh", first.as_str())]);
    let second = bundle(&again, "main.sh");
    assert_eq!(body(&second), body(&first));
}

#[test]
fn shared_file_is_emitted_once() {
    let dir = project(&[
        ("main.sh", "source a.sh\nsource b.sh\n"),
        ("a.sh", "source common.sh\n"),
        ("b.sh", "source common.sh\n"),
        ("common.sh", "COMMON_LOADED=1\n"),
    ]);
    let merged = bundle(&dir, "main.sh");
    assert_eq!(merged.matches("COMMON_LOADED=1").count(), 1);
}

#[test]
fn compile_writes_executable_output() {
    let dir = project(&[("main.sh", "echo hi\n")]);
    let output = dir.path().join("out/merged.sh");
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    shmerge::compile(&dir.path().join("main.sh"), &output, &Config::default_config()).unwrap();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("echo hi\n"));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}

#[test]
fn json_report_lists_declarations() {
    let dir = project(&[("main.sh", "cd sub\n"), ("sub/.keep", "")]);
    let resolution =
        shmerge::resolve_dependencies(&dir.path().join("main.sh"), &Config::default_config().settings).unwrap();
    let report = serde_json::to_value(resolution.report()).unwrap();
    assert_eq!(report["order"].as_array().unwrap().len(), 1);
    let declaration = &report["declarations"][0]["lines"][0]["declarations"][0];
    assert_eq!(declaration["kind"], "cd");
    assert_eq!(declaration["argument"], "sub");
    assert_eq!(report["declarations"][0]["lines"][0]["line"], 1);
    assert!(Path::new(declaration["resolved"].as_str().unwrap()).ends_with("sub"));
}
