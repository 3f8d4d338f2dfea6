#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    net::TcpListener,
    os::unix::process::ExitStatusExt,
    process::Command as StdCommand,
};

use assert_cmd::Command;
use common::{
    free_port, http_client, is_process_alive, wait_for_path, wait_for_path_removed,
    wait_for_pid_record, wait_for_process_exit,
};
use serde_json::Value;
use tempfile::tempdir;

fn pact_mock_service() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pact-mock-service"))
}

#[test]
fn start_records_a_pid_and_serves_requests() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    let port = free_port();

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    let record = pid_dir.join(format!("mock-service-{port}.pid"));
    let pid = wait_for_pid_record(&record);
    assert!(is_process_alive(pid));

    let response = http_client()
        .get(format!("http://127.0.0.1:{port}/"))
        .header("X-Pact-Mock-Service", "true")
        .send()
        .expect("mock service should answer");
    assert_eq!(response.status().as_u16(), 200);

    pact_mock_service()
        .args(["stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    wait_for_path_removed(&record);
    wait_for_process_exit(pid);
}

#[test]
fn second_start_on_the_same_identity_is_refused() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    let port = free_port();

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .failure()
        .code(2);

    pact_mock_service()
        .args(["stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();
}

#[test]
fn stop_without_a_record_reports_not_running() {
    let temp = tempdir().expect("failed to create tempdir");

    pact_mock_service()
        .args(["stop", "--port", "12345"])
        .arg("--pid-dir")
        .arg(temp.path())
        .assert()
        .failure()
        .code(3);
}

#[test]
fn stop_with_a_corrupt_record_fails_and_preserves_it() {
    let temp = tempdir().expect("failed to create tempdir");
    let record = temp.path().join("mock-service-7777.pid");
    fs::write(&record, "garbage\n").expect("failed to write record");

    pact_mock_service()
        .args(["stop", "--port", "7777"])
        .arg("--pid-dir")
        .arg(temp.path())
        .assert()
        .failure()
        .code(5);

    assert!(record.exists(), "corrupt record should be left for inspection");
}

#[test]
fn start_over_a_stale_record_succeeds() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    fs::create_dir_all(&pid_dir).expect("failed to create pid dir");
    let port = free_port();
    let record = pid_dir.join(format!("mock-service-{port}.pid"));
    fs::write(&record, "999999\n").expect("failed to write stale record");

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    let pid = wait_for_pid_record(&record);
    assert_ne!(pid, 999999);
    assert!(is_process_alive(pid));

    pact_mock_service()
        .args(["stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();
}

#[test]
fn start_over_a_corrupt_record_replaces_it() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    fs::create_dir_all(&pid_dir).expect("failed to create pid dir");
    let port = free_port();
    let record = pid_dir.join(format!("mock-service-{port}.pid"));
    fs::write(&record, "garbage\n").expect("failed to write corrupt record");

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    let pid = wait_for_pid_record(&record);
    assert!(is_process_alive(pid));

    pact_mock_service()
        .args(["stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();
}

#[test]
fn graceful_stop_writes_the_recorded_pact() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    let pact_dir = temp.path().join("pacts");
    let log = temp.path().join("mock.log");
    let port = free_port();

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--consumer", "Some Consumer", "--provider", "Some Provider"])
        .arg("--pact-dir")
        .arg(&pact_dir)
        .arg("--log")
        .arg(&log)
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    let record = pid_dir.join(format!("mock-service-{port}.pid"));
    wait_for_pid_record(&record);

    let client = http_client();
    let greeting = client
        .get(format!("http://127.0.0.1:{port}/greeting?name=world"))
        .send()
        .expect("greeting request should be served");
    assert_eq!(greeting.status().as_u16(), 200);
    assert!(
        greeting.headers().get("X-Pact-Mock-Service").is_some(),
        "recorded responses carry the marker header"
    );
    let orders = client
        .post(format!("http://127.0.0.1:{port}/orders"))
        .send()
        .expect("orders request should be served");
    assert_eq!(orders.status().as_u16(), 200);

    pact_mock_service()
        .args(["stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    let pact_path = pact_dir.join("some_consumer-some_provider.json");
    wait_for_path(&pact_path);
    let pact: Value =
        serde_json::from_str(&fs::read_to_string(&pact_path).expect("failed to read pact"))
            .expect("pact should be valid JSON");

    assert_eq!(pact["consumer"]["name"], "Some Consumer");
    assert_eq!(pact["provider"]["name"], "Some Provider");
    assert_eq!(pact["metadata"]["pactSpecification"]["version"], "2.0.0");

    let interactions = pact["interactions"]
        .as_array()
        .expect("interactions should be an array");
    // The liveness probe's own traffic must not be recorded.
    assert_eq!(interactions.len(), 2);
    let descriptions: Vec<&str> = interactions
        .iter()
        .filter_map(|i| i["description"].as_str())
        .collect();
    assert!(descriptions.contains(&"GET /greeting?name=world"));
    assert!(descriptions.contains(&"POST /orders"));
    let get = interactions
        .iter()
        .find(|i| i["description"] == "GET /greeting?name=world")
        .expect("greeting interaction");
    assert_eq!(get["request"]["query"], "name=world");

    assert!(log.exists(), "daemon should have logged to the given file");
}

#[test]
fn restart_replaces_the_daemon() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    let port = free_port();

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();
    let record = pid_dir.join(format!("mock-service-{port}.pid"));
    let first = wait_for_pid_record(&record);

    pact_mock_service()
        .args(["restart", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    let second = wait_for_pid_record(&record);
    assert_ne!(first, second);
    assert!(is_process_alive(second));
    wait_for_process_exit(first);

    pact_mock_service()
        .args(["stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();
}

#[test]
fn restart_without_a_prior_daemon_starts_one() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    let port = free_port();

    // The stop phase finds nothing to stop and the start phase proceeds.
    pact_mock_service()
        .args(["restart", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    let record = pid_dir.join(format!("mock-service-{port}.pid"));
    let pid = wait_for_pid_record(&record);
    assert!(is_process_alive(pid));

    pact_mock_service()
        .args(["stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();
}

#[test]
fn unresponsive_daemon_is_killed_but_stop_succeeds() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    fs::create_dir_all(&pid_dir).expect("failed to create pid dir");

    // Stand in for a hung daemon: ignores SIGINT, so stop must escalate.
    let mut sleeper = StdCommand::new("sh")
        .args(["-c", "trap '' INT; exec sleep 60"])
        .spawn()
        .expect("failed to spawn sleeper");
    let record = pid_dir.join("mock-service-9999.pid");
    fs::write(&record, format!("{}\n", sleeper.id())).expect("failed to write record");

    pact_mock_service()
        .args(["stop", "--port", "9999"])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    assert!(!record.exists(), "record should be cleared after the kill");
    let status = sleeper.wait().expect("failed to reap sleeper");
    assert_eq!(status.signal(), Some(9));
}

#[test]
fn a_child_that_exits_during_startup_is_reported() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");

    // Hold the port so the spawned service fails to bind and exits.
    let blocker = TcpListener::bind("127.0.0.1:0").expect("failed to bind blocker");
    let port = blocker.local_addr().expect("local addr").port();

    pact_mock_service()
        .args(["start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .failure()
        .code(6);

    assert!(
        !pid_dir.join(format!("mock-service-{port}.pid")).exists(),
        "record of the failed spawn should be cleared"
    );
}
