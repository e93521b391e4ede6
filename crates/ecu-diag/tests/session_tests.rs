//! Logging session tests against simulated ECUs

mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{RecordingSink, SimEcu};
use ecu_diag::config::{EcuKind, SupervisorConfig};
use ecu_diag::ecu_vars::{DataType, VariableDefinition, VariableRegistry};
use ecu_diag::logfile::LogReader;
use ecu_diag::{EcuError, LogSession, SessionConfig, SignalHub};

fn t8_registry() -> Arc<VariableRegistry> {
    Arc::new(
        VariableRegistry::new(vec![
            VariableDefinition::symbol("In.n_Engine", 0x0101, DataType::Uint16),
            VariableDefinition::symbol("ActualIn.T_Engine", 0x0202, DataType::Int16)
                .with_scale(0.1, 0.0),
        ])
        .unwrap(),
    )
}

fn session_config(
    ecu: &SimEcu,
    kind: EcuKind,
    variables: Arc<VariableRegistry>,
    dir: &Path,
    sink: Arc<RecordingSink>,
) -> SessionConfig {
    let mut config = SessionConfig::new(kind, ecu.mock.clone(), variables);
    config.frequency_hz = 20;
    config.log_dir = dir.to_path_buf();
    config.sink = sink;
    config.supervisor = SupervisorConfig {
        retry_delay_ms: 100,
        ..SupervisorConfig::default()
    };
    config
}

fn log_lines(dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let content = std::fs::read_to_string(entry.unwrap().path()).unwrap();
        lines.extend(content.lines().map(str::to_string));
    }
    lines
}

#[tokio::test(start_paused = true)]
async fn test_session_writes_decoded_lines() {
    let ecu = SimEcu::trionic8();
    ecu.set_register(vec![0x0B, 0xB8, 0xFF, 0x85]);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();
    let hub = SignalHub::new();
    let mut rpm = hub.subscribe(["In.n_Engine"], 64);

    let mut config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    config.hub = hub;
    let session = Arc::new(LogSession::new(config).unwrap());

    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(1020)).await;
    session.stop();
    running.await.unwrap().unwrap();

    let lines = log_lines(dir.path());
    assert!(lines.len() >= 15, "only {} lines", lines.len());
    for line in &lines {
        assert!(
            line.ends_with("|In.n_Engine=3000|ActualIn.T_Engine=-12,3|IMPORTANTLINE=0|"),
            "unexpected line {}",
            line
        );
    }

    let record = LogReader::open(std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap().path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(record.value("ActualIn.T_Engine"), Some(-12.3));

    assert_eq!(rpm.recv().await.unwrap().value, 3000.0);
    assert!(sink.has_message("Logging to "));
    assert!(sink.has_message("Connected to ECU"));
    assert!(sink.has_message("Live logging at 20 fps"));
    assert!(sink.has_message("Stop logging..."));
    assert!(sink.capture_counts.lock().contains(&10));
    assert_eq!(session.counters().errors(), 0);
    assert_eq!(session.signal_map().get("In.n_Engine").as_deref(), Some("3000"));

    // Session torn down on the ECU side
    assert_eq!(ecu.mock.count_requests(&[0x20]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_storm_trips_watchdog_and_retries() {
    let ecu = SimEcu::trionic8();
    ecu.state.fail_reads.store(true, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let mut config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    config.frequency_hz = 50;
    config.supervisor.retry_attempts = 2;
    let session = LogSession::new(config).unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, EcuError::TooManyErrors { count } if count > 10));

    assert_eq!(ecu.mock.count_requests(&[0x10, 0x03]), 2);
    assert_eq!(sink.count_messages("Retry 1: too many errors"), 1);
    assert_eq!(sink.count_messages("Retry 2"), 0);
    assert!(sink.has_message("Failed to read data: "));
    assert!(log_lines(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_first_handshake_failure_is_not_retried() {
    let ecu = SimEcu::trionic8();
    ecu.state.fail_start.store(true, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    let session = LogSession::new(config).unwrap();

    let err = session.start().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(ecu.mock.count_requests(&[0x10, 0x03]), 1);
    assert_eq!(sink.count_messages("Retry"), 0);
    assert!(!sink.has_message("Connected to ECU"));
}

#[tokio::test(start_paused = true)]
async fn test_ten_errors_per_second_keep_logging() {
    let ecu = SimEcu::trionic8();
    ecu.set_register(vec![0x0B, 0xB8, 0x00, 0x10]);
    ecu.state.failures_per_second.store(10, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    let session = Arc::new(LogSession::new(config).unwrap());
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(3500)).await;
    session.stop();
    running.await.unwrap().unwrap();

    assert_eq!(sink.count_messages("Retry"), 0);
    assert_eq!(ecu.mock.count_requests(&[0x10, 0x03]), 1);
    assert!(session.counters().errors() >= 30);
    assert!(!log_lines(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_eleven_errors_per_second_trip_watchdog() {
    let ecu = SimEcu::trionic8();
    ecu.set_register(vec![0x0B, 0xB8, 0x00, 0x10]);
    ecu.state.failures_per_second.store(11, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let mut config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    config.supervisor.retry_attempts = 1;
    let session = LogSession::new(config).unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, EcuError::TooManyErrors { count: 11 }));
    assert_eq!(session.counters().errors(), 11);
    assert_eq!(ecu.mock.count_requests(&[0x10, 0x03]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_starts_with_fresh_error_window() {
    let ecu = SimEcu::trionic8();
    ecu.set_register(vec![0x0B, 0xB8, 0x00, 0x10]);
    ecu.state.fail_reads.store(true, Ordering::SeqCst);
    ecu.state.failures_per_second.store(10, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    let session = Arc::new(LogSession::new(config).unwrap());
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });

    // First attempt trips just after one second, the retry follows 100 ms later
    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert_eq!(sink.count_messages("Retry 1: too many errors"), 1);
    ecu.state.fail_reads.store(false, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    session.stop();
    running.await.unwrap().unwrap();

    assert_eq!(sink.count_messages("Retry 2"), 0);
    assert_eq!(ecu.mock.count_requests(&[0x10, 0x03]), 2);
}

#[tokio::test(start_paused = true)]
async fn test_later_handshake_failure_is_retried() {
    let ecu = SimEcu::trionic8();
    ecu.state.fail_reads.store(true, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let mut config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    config.supervisor.retry_attempts = 3;
    let session = Arc::new(LogSession::new(config).unwrap());
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });

    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert_eq!(sink.count_messages("Retry 1: too many errors"), 1);
    ecu.state.fail_start.store(true, Ordering::SeqCst);

    let err = running.await.unwrap().unwrap_err();
    assert!(err.is_retryable());
    assert!(!matches!(err, EcuError::TooManyErrors { .. }));
    assert_eq!(ecu.mock.count_requests(&[0x10, 0x03]), 3);
    assert_eq!(sink.count_messages("Retry 2: "), 1);
    assert_eq!(sink.count_messages("Connected to ECU"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_line_stamped_when_read_is_issued() {
    let ecu = SimEcu::trionic8();
    ecu.set_register(vec![0x0B, 0xB8, 0x00, 0x10]);
    ecu.state.read_delay_ms.store(30, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let mut config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    config.frequency_hz = 5;
    let session = Arc::new(LogSession::new(config).unwrap());
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.stop();
    running.await.unwrap().unwrap();

    let path = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap().path();
    let record = LogReader::open(path).unwrap().next().unwrap().unwrap();
    let arrived = ecu.state.read_times.lock()[0].naive_local();
    assert!(
        record.timestamp <= arrived,
        "line stamped {} after the read arrived at {}",
        record.timestamp,
        arrived
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_session_and_silences_callbacks() {
    let ecu = SimEcu::trionic8();
    ecu.set_register(vec![0x03, 0x20, 0x00, 0x00]);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    let session = Arc::new(LogSession::new(config).unwrap());
    let stop = session.stop_handle();

    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    stop.stop();
    stop.stop();

    let result = tokio::time::timeout(Duration::from_millis(200), running)
        .await
        .expect("session did not stop within one tick");
    result.unwrap().unwrap();
    assert!(stop.is_stopped());

    let events = sink.events();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sink.events(), events);
    assert_eq!(sink.count_messages("Stop logging..."), 1);
}

#[tokio::test(start_paused = true)]
async fn test_short_register_skips_line_but_publishes_prefix() {
    let ecu = SimEcu::trionic8();
    // Enough for the first variable only
    ecu.set_register(vec![0x0B, 0xB8, 0x01]);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let mut config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    config.frequency_hz = 5;
    let session = Arc::new(LogSession::new(config).unwrap());

    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(900)).await;
    session.stop();
    running.await.unwrap().unwrap();

    assert!(log_lines(dir.path()).is_empty());
    assert!(sink.has_message("Failed to read ActualIn.T_Engine: "));
    assert!(session.counters().errors() >= 4);
    assert!(sink
        .values
        .lock()
        .iter()
        .any(|(name, value)| name == "In.n_Engine" && *value == 3000.0));
}

#[tokio::test(start_paused = true)]
async fn test_leftover_bytes_reported() {
    let ecu = SimEcu::trionic8();
    ecu.set_register(vec![0x0B, 0xB8, 0x00, 0x10, 0xDE, 0xAD]);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let config = session_config(&ecu, EcuKind::Trionic8, t8_registry(), dir.path(), sink.clone());
    let session = Arc::new(LogSession::new(config).unwrap());
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(120)).await;
    session.stop();
    running.await.unwrap().unwrap();

    assert!(sink.has_message("Leftovers 2: DEAD"));
    assert!(!log_lines(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_trionic7_logs_broadcast_values_first() {
    let ecu = SimEcu::trionic7();
    ecu.set_register(vec![0x00, 0x64]);
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();
    let variables = Arc::new(
        VariableRegistry::new(vec![VariableDefinition::symbol(
            "Out.M_Engine",
            0x0303,
            DataType::Int16,
        )])
        .unwrap(),
    );

    let config = session_config(&ecu, EcuKind::Trionic7, variables, dir.path(), sink.clone());
    let session = Arc::new(LogSession::new(config).unwrap());
    let running = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    ecu.mock.inject_frame(ecu_diag::transport::CanFrame::new(
        0x1A0,
        vec![0x00, 0x0B, 0xB8, 0x00, 0x00, 0x2D, 0x00, 0x00],
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.stop();
    running.await.unwrap().unwrap();

    let lines = log_lines(dir.path());
    let first = lines.first().unwrap();
    assert!(first.contains(
        "|ActualIn.n_Engine=0|In.v_Vehicle=0,0|Out.ST_LimpHome=0|Out.X_AccPedal=0,0|Out.M_Engine=100|"
    ));
    let last = lines.last().unwrap();
    assert!(last.contains("|ActualIn.n_Engine=3000|"));
    assert!(last.contains("|Out.X_AccPedal=45,0|"));
    assert_eq!(ecu.mock.sent_frames()[0].id, 0x220);
    assert_eq!(ecu.mock.count_requests(&[0x82]), 1);
}

#[test]
fn test_empty_registry_rejected() {
    let ecu = SimEcu::trionic8();
    let variables = Arc::new(VariableRegistry::new(Vec::new()).unwrap());
    let config = SessionConfig::new(EcuKind::Trionic8, ecu.mock.clone(), variables);
    assert!(matches!(
        LogSession::new(config),
        Err(EcuError::Configuration(_))
    ));
}
