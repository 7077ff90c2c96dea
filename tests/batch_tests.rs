//! Batch orchestration against a scripted backend

mod common;

use arsenal::batch::{BatchOrchestrator, FAILED_LIST, SKIPPED_LIST, read_failed_list};
use arsenal::config_file::RunConfig;
use arsenal::process_guard::InterruptFlag;
use arsenal::prompt::{AssumeYes, ScriptedPrompter};
use arsenal::retry::{Outcome, RetryController, SkipReason};
use arsenal::session::execute_batch;
use arsenal::types::{CleanupAction, FailureKind, SecondaryPass};

use common::{FakeBackend, Workspace, names, not_found, ok, policy};
use std::fs;

#[test]
fn test_one_installed_one_failed() {
    let ws = Workspace::new();
    let backend = FakeBackend::new("pacman")
        .respond("pkgA", vec![ok()])
        .respond("pkgB", vec![not_found("pkgB"), not_found("pkgB")]);

    let controller = RetryController::new(&backend, &ws.classifier, &ws.ledger, &ws.log, policy(2));
    let orchestrator = BatchOrchestrator::new(controller, &ws.log);

    let report = orchestrator.run(&names(&["pkgA", "pkgB"]));
    let lists = orchestrator.persist(&report).unwrap();

    assert_eq!(report.installed, vec!["pkgA"]);
    assert_eq!(report.failed, vec!["pkgB"]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.accounted(), 2);

    assert_eq!(lists.failed, ws.path().join(FAILED_LIST));
    assert_eq!(fs::read_to_string(&lists.failed).unwrap(), "pkgB\n");
    assert_eq!(backend.install_count("pkgA"), 1);
    assert_eq!(backend.install_count("pkgB"), 2);
}

#[test]
fn test_each_failed_attempt_keeps_its_output() {
    let ws = Workspace::new();
    let backend = FakeBackend::new("pacman");

    let controller = RetryController::new(&backend, &ws.classifier, &ws.ledger, &ws.log, policy(2));
    let result = controller.install("ghidra");

    assert_eq!(
        result.outcome,
        Outcome::Failed {
            attempts: 2,
            last_failure: FailureKind::Unknown
        }
    );
    for attempt in 1..=2 {
        let path = ws
            .path()
            .join("errors")
            .join(format!("ghidra.attempt{}.log", attempt));
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "error: target not found: ghidra"
        );
    }

    let log = fs::read_to_string(ws.log.path()).unwrap();
    assert!(log.contains("ghidra.attempt1.log"));
    assert!(log.contains("[ERROR]"));
}

#[test]
fn test_already_installed_is_never_invoked() {
    let ws = Workspace::new();
    let backend = FakeBackend::new("pacman").with_installed(&["nmap"]);

    let controller = RetryController::new(&backend, &ws.classifier, &ws.ledger, &ws.log, policy(2));
    let orchestrator = BatchOrchestrator::new(controller, &ws.log);
    let report = orchestrator.run(&names(&["nmap", "sqlmap"]));

    assert_eq!(
        report.skipped,
        vec![("nmap".to_string(), SkipReason::AlreadyInstalled)]
    );
    assert_eq!(backend.install_count("nmap"), 0);

    orchestrator.persist(&report).unwrap();
    assert_eq!(
        fs::read_to_string(ws.path().join(SKIPPED_LIST)).unwrap(),
        "nmap (already installed)\n"
    );
}

#[test]
fn test_attempts_stop_at_configured_maximum() {
    let ws = Workspace::new();
    let backend = FakeBackend::new("pacman");

    let controller = RetryController::new(&backend, &ws.classifier, &ws.ledger, &ws.log, policy(3));
    let result = controller.install("hashcat");

    assert!(matches!(result.outcome, Outcome::Failed { attempts: 3, .. }));
    assert_eq!(backend.install_count("hashcat"), 3);
}

#[test]
fn test_second_run_skips_everything_installed() {
    let ws = Workspace::new();
    let backend = FakeBackend::new("pacman")
        .respond("hydra", vec![ok()])
        .respond("john", vec![ok()]);
    let packages = names(&["hydra", "john"]);

    let controller = RetryController::new(&backend, &ws.classifier, &ws.ledger, &ws.log, policy(2));
    let orchestrator = BatchOrchestrator::new(controller, &ws.log);

    let first = orchestrator.run(&packages);
    assert_eq!(first.installed.len(), 2);

    let second = orchestrator.run(&packages);
    assert!(second.installed.is_empty());
    assert!(second.failed.is_empty());
    assert_eq!(second.skipped_for(SkipReason::AlreadyInstalled), 2);
    assert_eq!(backend.install_count("hydra"), 1);
    assert_eq!(backend.install_count("john"), 1);
}

#[test]
fn test_interrupt_skips_current_and_remaining() {
    let ws = Workspace::new();
    let flag = InterruptFlag::new();
    let backend = FakeBackend::new("pacman")
        .respond("a", vec![ok()])
        .interrupt_during("b", flag.clone());

    let controller = RetryController::new(&backend, &ws.classifier, &ws.ledger, &ws.log, policy(2))
        .with_interrupt(flag.clone());
    let orchestrator = BatchOrchestrator::new(controller, &ws.log).with_interrupt(flag.clone());

    let report = orchestrator.run(&names(&["a", "b", "c"]));

    assert!(report.interrupted);
    assert_eq!(report.installed, vec!["a"]);
    assert_eq!(report.skipped_for(SkipReason::Interrupted), 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.accounted(), report.total);
    assert_eq!(backend.install_count("b"), 1);
    assert_eq!(backend.install_count("c"), 0);

    // the interrupted attempt does not leave an error file behind
    assert!(!ws.path().join("errors").join("b.attempt1.log").exists());
}

#[test]
fn test_remediation_needs_an_attempt_left() {
    let ws = Workspace::new();
    let target = ws.path().join("usr_bin_tool");
    fs::write(&target, "from another package").unwrap();

    let backend = FakeBackend::new("pacman")
        .respond("tool", vec![common::conflict("tool", &[&target])])
        .with_owner(&target, "other");

    let controller = RetryController::new(&backend, &ws.classifier, &ws.ledger, &ws.log, policy(1));
    let result = controller.install("tool");

    assert_eq!(
        result.outcome,
        Outcome::Failed {
            attempts: 1,
            last_failure: FailureKind::FileConflict
        }
    );
    assert!(backend.removals().is_empty());
    assert!(result.conflicts.is_empty());
    assert!(target.exists());
}

#[test]
fn test_secondary_pass_recovers_failures() {
    let ws = Workspace::new();
    let primary = FakeBackend::new("pacman").respond("pkgA", vec![ok()]);
    let helper = FakeBackend::new("yay").respond("pkgB", vec![ok()]);

    let controller = RetryController::new(&primary, &ws.classifier, &ws.ledger, &ws.log, policy(2));
    let orchestrator = BatchOrchestrator::new(controller, &ws.log);

    let mut report = orchestrator.run(&names(&["pkgA", "pkgB"]));
    orchestrator.persist(&report).unwrap();
    assert_eq!(read_failed_list(ws.path()).unwrap(), vec!["pkgB"]);

    orchestrator.run_secondary_pass(&helper, &mut report).unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(report.installed, vec!["pkgA", "pkgB"]);
    assert_eq!(helper.install_count("pkgB"), 1);
    assert_eq!(helper.install_count("pkgA"), 0);
    assert!(read_failed_list(ws.path()).unwrap().is_empty());

    let secondary = report.secondary.expect("secondary report");
    assert_eq!(secondary.recovered, vec!["pkgB"]);
}

#[test]
fn test_execute_batch_unattended() {
    let ws = Workspace::new();
    let config = RunConfig {
        log_dir: ws.path().to_path_buf(),
        retry_delay_secs: 0,
        secondary_pass: SecondaryPass::Always,
        cleanup: Some(CleanupAction::Keep),
        ..RunConfig::default()
    };
    let primary = FakeBackend::new("pacman").respond("nikto", vec![ok()]);
    let helper = FakeBackend::new("yay");

    let summary = execute_batch(
        &names(&["nikto", "burpsuite"]),
        &primary,
        Some(&helper),
        &config,
        &AssumeYes,
        &ws.log,
        &InterruptFlag::new(),
    )
    .unwrap();

    assert_eq!(summary.report.installed, vec!["nikto"]);
    assert_eq!(summary.report.failed, vec!["burpsuite"]);
    assert_eq!(helper.install_count("burpsuite"), 1);
    assert_eq!(summary.cleanup, CleanupAction::Keep);
    assert_eq!(fs::read_to_string(summary.lists.failed).unwrap(), "burpsuite\n");
}

#[test]
fn test_execute_batch_declined_secondary_pass() {
    let ws = Workspace::new();
    let config = RunConfig {
        log_dir: ws.path().to_path_buf(),
        retry_delay_secs: 0,
        cleanup: Some(CleanupAction::Delete),
        ..RunConfig::default()
    };
    let primary = FakeBackend::new("pacman");
    let helper = FakeBackend::new("yay");
    let prompter = ScriptedPrompter::new([arsenal::prompt::Answer::Confirm(false)]);

    let summary = execute_batch(
        &names(&["wpscan"]),
        &primary,
        Some(&helper),
        &config,
        &prompter,
        &ws.log,
        &InterruptFlag::new(),
    )
    .unwrap();

    assert_eq!(summary.report.failed, vec!["wpscan"]);
    assert!(helper.calls().is_empty());
    assert!(summary.report.secondary.is_none());
    assert_eq!(prompter.remaining(), 0);
}
