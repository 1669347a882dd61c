use log::Log;
use std::fs;
use winstrap::log_collector::FILE_ONLY_TARGET;
use winstrap::LogCollector;

/// Integration test for the logging system
///
/// Tests that:
/// 1. LogCollector works as a `log::Log` implementation
/// 2. Records with target "parsed" reach the milestone log
/// 3. Records below the console level still reach disk
#[tokio::test]
async fn test_log_records_routed_by_target() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let collector = LogCollector::new(temp_dir.path(), log::LevelFilter::Off)
        .expect("Failed to initialize LogCollector");

    collector.log(
        &log::Record::builder()
            .args(format_args!("[Fetch] Downloaded a.exe (4 bytes)"))
            .level(log::Level::Info)
            .target("winstrap::orchestrator")
            .build(),
    );
    collector.log(
        &log::Record::builder()
            .args(format_args!("PHASE TRANSITION: building"))
            .level(log::Level::Info)
            .target("parsed")
            .build(),
    );
    collector.log(
        &log::Record::builder()
            .args(format_args!("[Exec] make.bat output line"))
            .level(log::Level::Debug)
            .target(FILE_ONLY_TARGET)
            .build(),
    );
    // Trace is below what the collector records.
    collector.log(
        &log::Record::builder()
            .args(format_args!("noisy trace"))
            .level(log::Level::Trace)
            .build(),
    );

    collector
        .wait_for_empty()
        .await
        .expect("Flush should complete");

    let full = fs::read_to_string(collector.session_log_path()).expect("Failed to read full log");
    assert!(full.contains("[INFO] [Fetch] Downloaded a.exe (4 bytes)"));
    assert!(full.contains("[INFO] PHASE TRANSITION: building"));
    assert!(full.contains("[DEBUG] [Exec] make.bat output line"));
    assert!(!full.contains("noisy trace"));

    let parsed_path = temp_dir
        .path()
        .join("parsed")
        .join(collector.session_log_path().file_name().unwrap());
    let parsed = fs::read_to_string(parsed_path).expect("Failed to read parsed log");
    assert!(parsed.contains("PHASE TRANSITION: building"));
    assert!(!parsed.contains("Downloaded a.exe"));
}

#[tokio::test]
async fn test_separate_sessions_write_separate_files() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let first = LogCollector::new(temp_dir.path(), log::LevelFilter::Off).unwrap();
    first.log_str("first session");
    first.wait_for_empty().await.unwrap();

    // Session names carry millisecond timestamps.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let second = LogCollector::new(temp_dir.path(), log::LevelFilter::Off).unwrap();
    second.log_str("second session");
    second.wait_for_empty().await.unwrap();

    assert_ne!(first.session_log_path(), second.session_log_path());
    let first_content = fs::read_to_string(first.session_log_path()).unwrap();
    assert!(first_content.contains("first session"));
    assert!(!first_content.contains("second session"));
}
