// Tests for session aggregation and report output - public API only

mod common;

use allure_adaptor::model::{AttachmentType, CaseId, Status, TestCase};
use allure_adaptor::report::{ENVIRONMENT_FILE, ReportWriter};
use allure_adaptor::state::{Aggregator, ModuleInfo, Recorder, StepOutcome, Verdict};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn module(id: &str) -> ModuleInfo {
    ModuleInfo::new(id, id.trim_end_matches(".py").replace('/', "."))
}

fn finished(name: &str, id: &str, status: Status) -> TestCase {
    let mut case = TestCase::new(name, 1_000);
    case.id = CaseId::from(id);
    case.status = Some(status);
    case.stop = Some(2_000);
    case
}

fn no_env() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[test]
fn test_duplicate_identity_keeps_last_report() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let mut aggregator = Aggregator::new();
    let m = module("tests/test_dup.py");

    // Act
    aggregator.record(finished("test_x", "X", Status::Failed), &m, no_env());
    aggregator.record(finished("test_x", "X", Status::Broken), &m, no_env());
    let summary = aggregator.finish_session(&writer);

    // Assert
    assert!(summary.is_clean());
    assert_eq!(summary.cases, 1);
    let suites = common::suites(temp_dir.path());
    assert_eq!(suites.len(), 1);
    let cases = common::named(&suites[0], "test-case");
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].attr("status"), Some("broken"));
    assert_eq!(common::case_names(&suites[0]), ["test_x"]);
}

#[test]
fn test_same_identity_any_number_of_times() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let mut aggregator = Aggregator::new();
    let m = module("tests/test_dup.py");

    // Act
    aggregator.record(finished("first", "A", Status::Passed), &m, no_env());
    for _ in 0..5 {
        aggregator.record(finished("second", "B", Status::Failed), &m, no_env());
    }
    aggregator.record(finished("third", "C", Status::Passed), &m, no_env());
    aggregator.finish_session(&writer);

    // Assert
    let suites = common::suites(temp_dir.path());
    assert_eq!(common::case_names(&suites[0]), ["first", "second", "third"]);
}

#[test]
fn test_attachment_round_trip() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let mut recorder = Recorder::new();
    recorder.begin_case("test_attach", None, Vec::new()).unwrap();
    recorder
        .attach("A", b"hello".as_slice(), AttachmentType::Text)
        .unwrap();
    let case = recorder.finalize(&Verdict::passed()).unwrap();
    let mut aggregator = Aggregator::new();
    aggregator.record(case, &module("tests/test_files.py"), no_env());

    // Act
    let summary = aggregator.finish_session(&writer);

    // Assert
    assert_eq!(summary.attachments, 1);
    let files = common::files_ending_with(temp_dir.path(), "-attachment.txt");
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"hello");

    let suites = common::suites(temp_dir.path());
    let attachments = common::named(&suites[0], "attachment");
    assert_eq!(attachments.len(), 1);
    let file_name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(attachments[0].attr("source"), Some(file_name.as_str()));
    assert_eq!(attachments[0].attr("title"), Some("A"));
    assert_eq!(attachments[0].attr("type"), Some("text/plain"));
}

#[test]
fn test_illegal_code_point_is_escaped_and_document_parses() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let mut case = finished("test_nul", "N", Status::Failed);
    case.failure = Some(allure_adaptor::model::Failure::new(
        "captured \u{0} output",
        Some("trace \u{1b}[31m".to_string()),
    ));
    let mut aggregator = Aggregator::new();
    aggregator.record(case, &module("tests/test_nul.py"), no_env());

    // Act
    aggregator.finish_session(&writer);

    // Assert
    let path = &common::files_ending_with(temp_dir.path(), "-testsuite.xml")[0];
    let raw = std::fs::read_to_string(path).unwrap();
    assert!(!raw.contains('\u{0}'));
    assert!(raw.contains("#x00"));
    assert!(raw.contains("#x1B"));

    let elements = common::parse(&raw);
    let message = common::named(&elements, "message");
    assert_eq!(message[0].text, "captured #x00 output");
}

#[test]
fn test_environment_written_once_with_all_parameters() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let mut aggregator = Aggregator::new();

    // Act
    aggregator.record_environment(BTreeMap::from([("a".to_string(), "1".to_string())]));
    aggregator.record_environment(BTreeMap::from([("b".to_string(), "2".to_string())]));
    let summary = aggregator.finish_session(&writer);
    let second = aggregator.finish_session(&writer);

    // Assert
    assert_eq!(summary.environment, Some(temp_dir.path().join(ENVIRONMENT_FILE)));
    assert!(second.environment.is_none());
    assert!(common::files_ending_with(temp_dir.path(), "-testsuite.xml").is_empty());

    let raw = std::fs::read_to_string(temp_dir.path().join(ENVIRONMENT_FILE)).unwrap();
    let elements = common::parse(&raw);
    assert_eq!(elements[0].name, "ns0:environment");
    let parameters = common::named(&elements, "parameter");
    assert_eq!(parameters.len(), 2);
    let keys: Vec<&str> = common::named(&elements, "key")
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    let values: Vec<&str> = common::named(&elements, "value")
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(keys, ["a", "b"]);
    assert_eq!(values, ["1", "2"]);
}

#[test]
fn test_suites_keyed_by_module_with_timestamps() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let mut aggregator = Aggregator::new();
    let mut early = finished("early", "1", Status::Passed);
    early.start = 100;
    early.stop = Some(300);
    let mut late = finished("late", "2", Status::Passed);
    late.start = 200;
    late.stop = Some(900);

    // Act
    aggregator.record(early, &module("tests/test_a.py").with_doc("Module A"), no_env());
    aggregator.record(late, &module("tests/test_a.py"), no_env());
    aggregator.record(finished("other", "3", Status::Passed), &module("tests/test_b.py"), no_env());
    let summary = aggregator.finish_session(&writer);

    // Assert
    assert_eq!(summary.suites.len(), 2);
    let suites = common::suites(temp_dir.path());
    let suite_a = suites
        .iter()
        .find(|s| common::case_names(s) == ["early", "late"])
        .expect("suite of module a");
    let root = &suite_a[0];
    assert_eq!(root.name, "ns0:test-suite");
    assert_eq!(root.attr("xmlns:ns0"), Some("urn:model.allure.qatools.yandex.ru"));
    assert_eq!(root.attr("start"), Some("100"));
    assert_eq!(root.attr("stop"), Some("900"));
    let description = suite_a
        .iter()
        .find(|e| e.name == "description" && e.path.len() == 1)
        .expect("suite description");
    assert_eq!(description.text, "Module A");
}

#[test]
fn test_step_tree_serialized() {
    // Arrange
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let writer = ReportWriter::create(temp_dir.path()).unwrap();
    let mut recorder = Recorder::new();
    recorder.begin_case("test_steps", None, Vec::new()).unwrap();
    recorder.begin_step("outer").unwrap();
    recorder.begin_step("inner").unwrap();
    recorder.end_step(StepOutcome::Failed).unwrap();
    recorder.end_step(StepOutcome::Failed).unwrap();
    let case = recorder
        .finalize(&Verdict::new(Status::Failed).with_message("E").with_trace("T"))
        .unwrap();
    let mut aggregator = Aggregator::new();
    aggregator.record(case, &module("tests/test_steps.py"), no_env());

    // Act
    aggregator.finish_session(&writer);

    // Assert
    let suites = common::suites(temp_dir.path());
    let steps = common::named(&suites[0], "step");
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.attr("status") == Some("failed")));
    assert_eq!(steps[1].path.iter().filter(|p| *p == "step").count(), 1);
    let trace = common::named(&suites[0], "stack-trace");
    assert_eq!(trace[0].text, "T");
}
