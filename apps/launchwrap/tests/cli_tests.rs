//! Integration tests for the launcher command line and launch flow.

#![allow(clippy::unwrap_used, clippy::panic)]

use launchwrap::builtin::INSPECT_ENTRY;
use launchwrap::cli::{Cli, cmd_launch, split_arguments};
use launchwrap::config::{CONFIG_FILE_NAME, Config};
use launchwrap_core::primitives::{CACHE_FILE_NAME, DEFAULT_TWEAKER};
use launchwrap_core::{LoaderError, TweakerDescriptor};
use std::path::{Path, PathBuf};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| (*t).to_string()).collect()
}

/// Game directory with a `classes` origin and a config pointing at it.
fn game_dir_with_config(extra: &str) -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let classes = temp.path().join("classes");
    std::fs::create_dir_all(&classes).unwrap();

    let config = format!(
        "[classpath]\norigins = [{:?}]\n{}",
        classes.display().to_string(),
        extra
    );
    let config_path = temp.path().join(CONFIG_FILE_NAME);
    std::fs::write(&config_path, config).unwrap();
    (temp, config_path)
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

// =============================================================================
// ARGUMENT SPLITTING
// =============================================================================

#[test]
fn split_keeps_program_name_and_known_options() {
    let (known, leftovers) = split_arguments(argv(&[
        "launchwrap",
        "--tweakClass",
        "a.B",
        "--width",
        "800",
        "--version=1.7",
    ]));

    assert_eq!(known, argv(&["launchwrap", "--tweakClass", "a.B", "--version=1.7"]));
    assert_eq!(leftovers, argv(&["--width", "800"]));
}

#[test]
fn split_stops_at_double_dash() {
    let (known, leftovers) =
        split_arguments(argv(&["launchwrap", "--", "--tweakClass", "x.Y", "plain"]));

    assert_eq!(known, argv(&["launchwrap"]));
    assert_eq!(leftovers, argv(&["--tweakClass", "x.Y", "plain"]));
}

#[test]
fn split_of_empty_input_is_empty() {
    let (known, leftovers) = split_arguments(Vec::<String>::new());
    assert!(known.is_empty());
    assert!(leftovers.is_empty());
}

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn no_tweak_class_means_default_bundle() {
    let cli = Cli::parse_args(argv(&["launchwrap", "--username", "steve"])).unwrap();

    assert_eq!(cli.tweakers(), vec![TweakerDescriptor::new(DEFAULT_TWEAKER)]);
    assert_eq!(cli.leftovers, argv(&["--username", "steve"]));
    assert_eq!(cli.profile, None);
}

#[test]
fn repeated_tweak_class_keeps_order() {
    let cli = Cli::parse_args(argv(&[
        "launchwrap",
        "--tweakClass",
        "b.Second",
        "--gameDir",
        "/tmp/game",
        "--tweakClass=a.First",
    ]))
    .unwrap();

    let names: Vec<String> = cli.tweakers().into_iter().map(|d| d.name).collect();
    assert_eq!(names, argv(&["b.Second", "a.First"]));
    assert_eq!(cli.game_dir, Some(PathBuf::from("/tmp/game")));
    assert!(cli.leftovers.is_empty());
}

#[test]
fn known_option_without_value_is_an_error() {
    assert!(Cli::parse_args(argv(&["launchwrap", "--gameDir"])).is_err());
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[test]
fn config_file_in_game_dir_is_picked_up() {
    let (temp, _) = game_dir_with_config("launch_target = \"app.Main\"\n");

    let config = Config::load(None, temp.path()).unwrap();
    assert_eq!(config.launch_target, "app.Main");
    assert_eq!(config.classpath.origins, vec![temp.path().join("classes")]);
}

// =============================================================================
// LAUNCH
// =============================================================================

#[test]
fn launch_runs_inspect_and_creates_cache() {
    let (temp, config_path) = game_dir_with_config("");

    let cli = Cli::parse_args(vec![
        "launchwrap".to_string(),
        "--version".to_string(),
        "test".to_string(),
        "--gameDir".to_string(),
        path_arg(temp.path()),
        "--config".to_string(),
        path_arg(&config_path),
        "--demo".to_string(),
    ])
    .unwrap();

    let report = cmd_launch(cli).unwrap();

    assert_eq!(report.target, INSPECT_ENTRY);
    assert_eq!(report.bundles, vec![DEFAULT_TWEAKER.to_string()]);
    assert_eq!(
        report.arguments,
        vec![
            "--version".to_string(),
            "test".to_string(),
            "--gameDir".to_string(),
            path_arg(temp.path()),
            "--demo".to_string(),
        ]
    );
    assert!(temp.path().join(CACHE_FILE_NAME).is_file());
}

#[test]
fn launch_without_cache_leaves_no_file() {
    let (temp, config_path) = game_dir_with_config("[cache]\nenabled = false\n");

    let cli = Cli::parse_args(vec![
        "launchwrap".to_string(),
        "--gameDir".to_string(),
        path_arg(temp.path()),
        "--config".to_string(),
        path_arg(&config_path),
    ])
    .unwrap();

    cmd_launch(cli).unwrap();
    assert!(!temp.path().join(CACHE_FILE_NAME).exists());
}

#[test]
fn unknown_bundle_fails_startup() {
    let (temp, config_path) = game_dir_with_config("");

    let cli = Cli::parse_args(vec![
        "launchwrap".to_string(),
        "--gameDir".to_string(),
        path_arg(temp.path()),
        "--config".to_string(),
        path_arg(&config_path),
        "--tweakClass".to_string(),
        "missing.Bundle".to_string(),
    ])
    .unwrap();

    match cmd_launch(cli) {
        Err(LoaderError::StartupFailure(cause)) => {
            assert!(matches!(*cause, LoaderError::UnknownSymbol { .. }));
        }
        other => panic!("expected startup failure, got {:?}", other),
    }
}

#[test]
fn launch_target_without_unit_fails() {
    let (temp, config_path) = game_dir_with_config("launch_target = \"app.Missing\"\n");

    let cli = Cli::parse_args(vec![
        "launchwrap".to_string(),
        "--gameDir".to_string(),
        path_arg(temp.path()),
        "--config".to_string(),
        path_arg(&config_path),
    ])
    .unwrap();

    assert!(matches!(
        cmd_launch(cli),
        Err(LoaderError::StartupFailure(_))
    ));
}
