//! Run-command flag parsing and layering over configuration.

use clap::Parser;
use hipk_cli::commands::RunCommand;
use hipk_harness::{Backend, HarnessConfig, InputFill, ScaleConvention};

#[derive(Parser)]
struct TestCli {
    #[command(flatten)]
    cmd: RunCommand,
}

fn parse_args(args: &[&str]) -> Result<RunCommand, clap::Error> {
    TestCli::try_parse_from(args).map(|cli| cli.cmd)
}

#[test]
fn no_flags_leave_config_untouched() {
    let cmd = parse_args(&["test-cli"]).unwrap();
    let mut cfg = HarnessConfig::default();
    cmd.apply(&mut cfg);
    assert_eq!(cfg, HarnessConfig::default());
}

#[test]
fn flags_override_config() {
    let cmd = parse_args(&[
        "test-cli",
        "--artifact",
        "k.co",
        "-m",
        "128",
        "-n",
        "8",
        "--scale",
        "0.25",
        "--convention",
        "pre-scaled",
        "--backend",
        "emulated",
        "--async",
        "--runs",
        "10",
    ])
    .unwrap();
    let mut cfg = HarnessConfig::default();
    cmd.apply(&mut cfg);
    assert_eq!(cfg.kernel.artifact.to_str(), Some("k.co"));
    assert_eq!((cfg.problem.m, cfg.problem.n), (128, 8));
    assert_eq!(cfg.problem.scale, 0.25);
    assert_eq!(cfg.validation.convention, ScaleConvention::PreScaled);
    assert_eq!(cfg.launch.backend, Backend::Emulated);
    assert!(!cfg.launch.synchronous);
    assert_eq!(cfg.launch.runs, 10);
}

#[test]
fn seed_selects_random_input() {
    let cmd = parse_args(&["test-cli", "--seed", "5"]).unwrap();
    let mut cfg = HarnessConfig::default();
    cmd.apply(&mut cfg);
    assert_eq!(cfg.problem.fill, InputFill::Random { seed: 5 });
}

#[test]
fn fill_and_seed_conflict() {
    assert!(parse_args(&["test-cli", "--fill", "0.5", "--seed", "5"]).is_err());
}

#[test]
fn unknown_convention_is_rejected() {
    assert!(parse_args(&["test-cli", "--convention", "sideways"]).is_err());
}

#[test]
fn unknown_backend_is_rejected() {
    assert!(parse_args(&["test-cli", "--backend", "cuda"]).is_err());
}
