// Tests for the host listener - public API only

mod common;

use allure_adaptor::host::{ListenerOptions, Scope, TestDescriptor, TestId, TestListener};
use allure_adaptor::model::{AttachmentType, Label, Status};
use allure_adaptor::report::ReportWriter;
use allure_adaptor::state::{
    Aggregator, EnvelopeWriter, ModuleInfo, Phase, PhaseOutcome, PhaseReport, StepOutcome,
    read_records,
};
use allure_adaptor::AdaptorError;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn coordinator() -> (TestListener, Arc<Mutex<Aggregator>>) {
    let aggregator = Arc::new(Mutex::new(Aggregator::new()));
    let listener = TestListener::new(aggregator.clone(), ListenerOptions::default());
    (listener, aggregator)
}

fn descriptor(module: &str, test: &str) -> TestDescriptor {
    TestDescriptor::new(
        format!("{}::{}", module, test),
        ModuleInfo::new(module, module.trim_end_matches(".py").replace('/', ".")),
    )
    .with_scope(Scope::new(test))
}

fn run_phases(listener: &TestListener, id: &TestId, reports: Vec<PhaseReport>) -> Option<Status> {
    let mut last = None;
    for report in reports {
        last = listener.test_finished(id, report).expect("known test");
    }
    last
}

#[test]
fn test_phase_outcomes_resolve_case_status() {
    // Arrange
    let (listener, _) = coordinator();
    let scenarios = vec![
        (
            "passed",
            vec![
                PhaseReport::passed(Phase::Setup),
                PhaseReport::passed(Phase::Call),
                PhaseReport::passed(Phase::Teardown),
            ],
            Status::Passed,
        ),
        (
            "failed",
            vec![
                PhaseReport::passed(Phase::Setup),
                PhaseReport::failed(Phase::Call, "assert False", "trace"),
                PhaseReport::passed(Phase::Teardown),
            ],
            Status::Failed,
        ),
        (
            "xfail",
            vec![
                PhaseReport::passed(Phase::Setup),
                PhaseReport::skipped(Phase::Call, "known bug").expected_failure(),
                PhaseReport::passed(Phase::Teardown),
            ],
            Status::Pending,
        ),
        (
            "skipped",
            vec![
                PhaseReport::skipped(Phase::Setup, "no network"),
                PhaseReport::passed(Phase::Teardown),
            ],
            Status::Canceled,
        ),
        (
            "setup_error",
            vec![
                PhaseReport::failed(Phase::Setup, "fixture", "trace"),
                PhaseReport::passed(Phase::Teardown),
            ],
            Status::Broken,
        ),
        (
            "teardown_error",
            vec![
                PhaseReport::passed(Phase::Setup),
                PhaseReport::passed(Phase::Call),
                PhaseReport::failed(Phase::Teardown, "cleanup", "trace"),
            ],
            Status::Broken,
        ),
    ];

    for (name, reports, expected) in scenarios {
        // Act
        let descriptor = descriptor("tests/test_phases.py", name);
        listener.test_started(&descriptor).unwrap();
        let status = run_phases(&listener, &descriptor.id, reports);

        // Assert
        assert_eq!(status, Some(expected), "scenario {}", name);
    }
}

#[test]
fn test_labels_inherited_from_ancestry() {
    // Arrange
    let (listener, aggregator) = coordinator();
    let descriptor = TestDescriptor::new(
        "tests/test_shop.py::TestCart::test_add",
        ModuleInfo::new("tests/test_shop.py", "tests.test_shop"),
    )
    .with_module_labels([Label::new("feature", "shop")])
    .with_scope(Scope::new("TestCart").with_labels([Label::new("severity", "critical")]))
    .with_scope(Scope::new("test_add").with_labels([Label::new("story", "add item")]));

    // Act
    listener.test_started(&descriptor).unwrap();
    listener
        .add_label(&descriptor.id, "issue", ["SHOP-1"])
        .unwrap();
    run_phases(
        &listener,
        &descriptor.id,
        vec![
            PhaseReport::passed(Phase::Call),
            PhaseReport::passed(Phase::Teardown),
        ],
    );

    // Assert
    let aggregator = aggregator.lock().unwrap();
    let case = &aggregator.suite("tests/test_shop.py").unwrap().cases[0];
    assert_eq!(case.name, "TestCart.test_add");
    assert_eq!(case.label_values("feature").collect::<Vec<_>>(), ["shop"]);
    assert_eq!(case.label_values("story").collect::<Vec<_>>(), ["add item"]);
    assert_eq!(case.label_values("severity").collect::<Vec<_>>(), ["critical"]);
    assert_eq!(case.label_values("issue").collect::<Vec<_>>(), ["SHOP-1"]);
}

#[test]
fn test_steps_and_attachments_routed_per_test() {
    // Arrange
    let (listener, aggregator) = coordinator();
    let a = descriptor("tests/test_mix.py", "test_a");
    let b = descriptor("tests/test_mix.py", "test_b");
    listener.test_started(&a).unwrap();
    listener.test_started(&b).unwrap();

    // Act
    listener.begin_step(&a.id, "step of a").unwrap();
    listener.begin_step(&b.id, "step of b").unwrap();
    listener
        .attach(&a.id, "log", "a-log", AttachmentType::Text)
        .unwrap();
    listener.end_step(&b.id, StepOutcome::Passed).unwrap();
    listener.end_step(&a.id, StepOutcome::Failed).unwrap();
    for id in [&a.id, &b.id] {
        listener
            .test_finished(id, PhaseReport::passed(Phase::Teardown))
            .unwrap();
    }

    // Assert
    let aggregator = aggregator.lock().unwrap();
    let suite = aggregator.suite("tests/test_mix.py").unwrap();
    let case_a = suite.cases.iter().find(|c| c.name == "test_a").unwrap();
    let case_b = suite.cases.iter().find(|c| c.name == "test_b").unwrap();
    assert_eq!(case_a.steps[0].name, "step of a");
    assert_eq!(case_a.steps[0].status, Some(Status::Failed));
    assert_eq!(case_a.steps[0].attachments[0].title, "log");
    assert_eq!(case_b.steps[0].status, Some(Status::Passed));
    assert!(case_b.steps[0].attachments.is_empty());
}

#[test]
fn test_threads_bind_to_their_own_test() {
    // Arrange
    let (listener, _) = coordinator();
    let listener = Arc::new(listener);

    // Act
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let listener = listener.clone();
            std::thread::spawn(move || {
                let descriptor = descriptor("tests/test_threads.py", &format!("test_{}", i));
                listener.test_started(&descriptor).unwrap();
                let bound = listener.current_test();
                listener
                    .test_finished(&descriptor.id, PhaseReport::passed(Phase::Teardown))
                    .unwrap();
                (descriptor.id, bound, listener.current_test())
            })
        })
        .collect();

    // Assert
    for handle in handles {
        let (id, bound, after) = handle.join().unwrap();
        assert_eq!(bound, Some(id));
        assert_eq!(after, None);
    }
    assert_eq!(listener.in_flight(), 0);
}

#[test]
fn test_end_step_without_step_surfaces_protocol_error() {
    // Arrange
    let (listener, _) = coordinator();
    let d = descriptor("tests/test_proto.py", "test_p");
    listener.test_started(&d).unwrap();

    // Act
    let err = listener.end_step(&d.id, StepOutcome::Passed).unwrap_err();

    // Assert
    assert!(matches!(err, AdaptorError::Protocol(_)));
    assert!(err.to_string().contains("no step is open"));
    assert_eq!(listener.in_flight(), 1);
}

#[test]
fn test_collection_failures_written_as_one_suite() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let (listener, aggregator) = coordinator();

    // Act
    listener.collection_failed(
        "tests/test_import.py",
        PhaseOutcome::Failed,
        "ImportError: nope",
        Some("Traceback".to_string()),
    );
    listener.collection_failed("tests/test_win.py", PhaseOutcome::Skipped, "windows only", None);
    let mut summary = listener.finish_session(&writer);
    summary.merge(aggregator.lock().unwrap().finish_session(&writer));

    // Assert
    assert!(summary.is_clean());
    let suites = common::suites(temp_dir.path());
    assert_eq!(suites.len(), 1);
    let title = suites[0]
        .iter()
        .find(|e| e.name == "title" && e.path.len() == 1)
        .unwrap();
    assert_eq!(title.text, "Collection phase");
    let statuses: Vec<_> = common::named(&suites[0], "test-case")
        .iter()
        .map(|c| c.attr("status").unwrap_or_default().to_string())
        .collect();
    assert_eq!(statuses, ["broken", "canceled"]);
}

#[test]
fn test_worker_envelopes_merge_into_coordinator() {
    // Arrange
    let sink = Arc::new(EnvelopeWriter::new(Vec::new()));
    let worker = TestListener::new(sink.clone(), ListenerOptions::default());
    let d = descriptor("tests/test_remote.py", "test_r");
    worker.test_started(&d).unwrap();
    worker
        .attach(&d.id, "shot", vec![137u8, 80, 78, 71], AttachmentType::Png)
        .unwrap();
    worker
        .add_environment(None, [("python".to_string(), "3.12".to_string())].into())
        .unwrap();
    run_phases(
        &worker,
        &d.id,
        vec![
            PhaseReport::passed(Phase::Call),
            PhaseReport::passed(Phase::Teardown),
        ],
    );
    drop(worker);
    let bytes = Arc::try_unwrap(sink)
        .ok()
        .expect("sole owner")
        .into_inner()
        .unwrap();

    // Act
    let mut aggregator = Aggregator::new();
    for record in read_records(bytes.as_slice()).unwrap() {
        aggregator.record_wire(record);
    }

    // Assert
    let case = &aggregator.suite("tests/test_remote.py").unwrap().cases[0];
    assert_eq!(case.status, Some(Status::Passed));
    assert_eq!(case.attachments[0].kind, AttachmentType::Png);
    assert_eq!(aggregator.environment().get("python"), Some("3.12"));
}
