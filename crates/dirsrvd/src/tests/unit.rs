//! Unit tests for the server bootstrap utilities.

use std::sync::Arc;

use rstest::rstest;

use dirsrv_config::Config;
use dirsrv_types::{ResultCode, SearchScope};

use crate::psearch::{ChangeTypes, PersistentSearch, PersistentSearchControl};
use crate::{
    BootstrapError, ServerComponents, StaticConfigLoader, SystemConfigLoader, WorkflowError,
    bootstrap_with,
};

use super::support::{
    FailingConfigLoader, HealthEvent, RecordingHandler, RecordingHealthReporter, RecordingSink,
    TestConfigLoader, dn,
};

#[rstest]
fn bootstrap_reports_start_and_success() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let server = bootstrap_with(&loader, reporter.clone(), ServerComponents::default())
        .expect("bootstrap should succeed");

    assert_eq!(
        reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
    assert!(server.paths().config_dir().is_dir());
    assert_eq!(server.config().cancel_timeout_ms, 200);
}

#[rstest]
fn bootstrap_loads_an_empty_compressed_schema() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let server = bootstrap_with(&loader, reporter, ServerComponents::default())
        .expect("bootstrap should succeed");

    let context = server.context();
    let schema = context.schema().expect("schema should be installed");
    assert_eq!(schema.object_class_token_count(), 0);
    assert_eq!(schema.attribute_token_count(), 0);
}

#[rstest]
fn configuration_failures_surface_as_bootstrap_errors() {
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = bootstrap_with(
        &FailingConfigLoader,
        reporter.clone(),
        ServerComponents::default(),
    )
    .err()
    .expect("bootstrap should fail");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
    assert!(matches!(
        reporter.events().last(),
        Some(HealthEvent::BootstrapFailed(_))
    ));
}

#[rstest]
fn static_loader_hands_back_its_configuration() {
    let instance = tempfile::tempdir().expect("temporary directory");
    let instance_dir = camino::Utf8PathBuf::from_path_buf(instance.path().to_path_buf())
        .expect("temporary path should be UTF-8");
    let config = Config {
        instance_dir,
        server_error_result_code: ResultCode::Busy.as_int(),
        ..Config::default()
    };
    let reporter = Arc::new(RecordingHealthReporter::default());

    let server = bootstrap_with(
        &StaticConfigLoader::new(config),
        reporter,
        ServerComponents::default(),
    )
    .expect("bootstrap should succeed");

    assert_eq!(
        server.context().settings().server_error_result_code(),
        ResultCode::Busy
    );
}

#[rstest]
fn system_loader_resolves_defaults_beneath_cli_flags() {
    let instance = tempfile::tempdir().expect("temporary directory");
    let instance_dir = instance.path().to_str().expect("temporary path should be UTF-8");
    let loader = SystemConfigLoader::from_args([
        "dirsrvd",
        "--instance-dir",
        instance_dir,
        "--cancel-timeout-ms",
        "250",
    ]);
    let reporter = Arc::new(RecordingHealthReporter::default());

    let server = bootstrap_with(&loader, reporter, ServerComponents::default())
        .expect("bootstrap should succeed");

    let config = server.config();
    assert_eq!(config.cancel_timeout_ms, 250);
    assert_eq!(config.server_error_result_code, 80);
    assert_eq!(config.max_persistent_searches(), None);
    assert_eq!(config.instance_dir.as_str(), instance_dir);
    assert!(server.paths().config_dir().is_dir());
}

#[rstest]
fn workflow_registration_is_reported() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let server = bootstrap_with(&loader, reporter.clone(), ServerComponents::default())
        .expect("bootstrap should succeed");

    server
        .register_workflow(dn("dc=example,dc=com"), RecordingHandler::succeeding())
        .expect("first registration should succeed");
    let duplicate = server
        .register_workflow(dn("dc=example,dc=com"), RecordingHandler::succeeding())
        .expect_err("duplicate registration should fail");
    let missing = server
        .remove_workflow(&dn("dc=other,dc=org"))
        .expect_err("unknown base should fail");

    assert!(matches!(duplicate, WorkflowError::Duplicate { .. }));
    assert!(matches!(missing, WorkflowError::NotFound { .. }));
    let events = reporter.events();
    assert!(events.contains(&HealthEvent::WorkflowRegistered(dn("dc=example,dc=com"))));
    let failures = events
        .iter()
        .filter(|event| matches!(event, HealthEvent::WorkflowFailed(_)))
        .count();
    assert_eq!(failures, 2);
}

#[rstest]
fn shutdown_ends_persistent_searches() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let server = bootstrap_with(&loader, reporter.clone(), ServerComponents::default())
        .expect("bootstrap should succeed");
    let sink = RecordingSink::new();
    let search = Arc::new(PersistentSearch::new(
        crate::OperationKey::new(1, 1, 1),
        dn("dc=example,dc=com"),
        SearchScope::WholeSubtree,
        dirsrv_types::SearchFilter::match_all(),
        Vec::new(),
        PersistentSearchControl::new(ChangeTypes::all(), true, false),
        sink.clone(),
    ));
    server
        .context()
        .persistent_searches()
        .register(Arc::clone(&search))
        .expect("registration should succeed");

    server.shutdown();

    assert!(server.context().persistent_searches().is_empty());
    assert!(search.is_cancelled());
    assert_eq!(
        sink.done().first().map(|(code, _)| *code),
        Some(ResultCode::Unavailable)
    );
    assert!(reporter.events().contains(&HealthEvent::ShutdownStarting));
}
