#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use common::{
    free_port, http_client, wait_for_path, wait_for_path_removed, wait_for_pid_record,
    wait_for_process_exit, wait_for_server,
};
use tempfile::tempdir;

fn pact_mock_service() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pact-mock-service"))
}

fn mock_port_from(location: &str) -> u16 {
    location
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(|| panic!("unexpected Location header: {location}"))
}

#[test]
fn control_server_manages_mock_lifecycles() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    let log_dir = temp.path().join("logs");
    let pact_dir = temp.path().join("pacts");
    let port = free_port();

    pact_mock_service()
        .args(["control-start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .arg("--log-dir")
        .arg(&log_dir)
        .arg("--pact-dir")
        .arg(&pact_dir)
        .assert()
        .success();

    let control_record = pid_dir.join(format!("mock-service-control-{port}.pid"));
    let control_pid = wait_for_pid_record(&control_record);

    let client = http_client();
    let base = format!("http://127.0.0.1:{port}/");

    let index = client.get(&base).send().expect("index request");
    assert_eq!(index.status().as_u16(), 200);
    assert!(index.text().expect("index body").contains("Control server"));

    // Missing provider header is refused before anything is spawned.
    let refused = client
        .post(&base)
        .header("X-Pact-Consumer", "Some Consumer")
        .send()
        .expect("refused request");
    assert_eq!(refused.status().as_u16(), 400);

    let created = client
        .post(&base)
        .header("X-Pact-Consumer", "Some Consumer")
        .header("X-Pact-Provider", "Some Provider")
        .send()
        .expect("create request");
    assert_eq!(created.status().as_u16(), 201);
    let location = created
        .headers()
        .get("Location")
        .and_then(|v| v.to_str().ok())
        .expect("created mock should advertise its location")
        .to_string();
    let mock_port = mock_port_from(&location);
    wait_for_server(mock_port);

    let mock_record = pid_dir.join(format!("mock-service-{mock_port}.pid"));
    wait_for_pid_record(&mock_record);

    let greeting = client
        .get(format!("http://127.0.0.1:{mock_port}/greeting"))
        .send()
        .expect("mock request");
    assert_eq!(greeting.status().as_u16(), 200);

    // A second registration for the same pair reuses the running mock.
    let reused = client
        .post(&base)
        .header("X-Pact-Consumer", "Some Consumer")
        .header("X-Pact-Provider", "Some Provider")
        .send()
        .expect("reuse request");
    assert_eq!(reused.status().as_u16(), 200);
    let reused_location = reused
        .headers()
        .get("Location")
        .and_then(|v| v.to_str().ok())
        .expect("reused mock should advertise its location");
    assert_eq!(reused_location, location);

    let deleted = client
        .delete(&base)
        .header("X-Pact-Consumer", "Some Consumer")
        .header("X-Pact-Provider", "Some Provider")
        .send()
        .expect("delete request");
    assert_eq!(deleted.status().as_u16(), 204);

    wait_for_path_removed(&mock_record);
    wait_for_path(&pact_dir.join("some_consumer-some_provider.json"));

    let unknown = client
        .delete(&base)
        .header("X-Pact-Consumer", "Nobody")
        .header("X-Pact-Provider", "Nothing")
        .send()
        .expect("unknown delete request");
    assert_eq!(unknown.status().as_u16(), 404);

    pact_mock_service()
        .args(["control-stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    wait_for_path_removed(&control_record);
    wait_for_process_exit(control_pid);
}

#[test]
fn control_stop_reaps_managed_mocks() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_dir = temp.path().join("pids");
    let log_dir = temp.path().join("logs");
    let port = free_port();

    pact_mock_service()
        .args(["control-start", "--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .arg("--log-dir")
        .arg(&log_dir)
        .assert()
        .success();

    let client = http_client();
    let created = client
        .post(format!("http://127.0.0.1:{port}/"))
        .header("X-Pact-Consumer", "Orphan Consumer")
        .header("X-Pact-Provider", "Orphan Provider")
        .send()
        .expect("create request");
    assert_eq!(created.status().as_u16(), 201);
    let location = created
        .headers()
        .get("Location")
        .and_then(|v| v.to_str().ok())
        .expect("created mock should advertise its location")
        .to_string();
    let mock_port = mock_port_from(&location);
    let mock_record = pid_dir.join(format!("mock-service-{mock_port}.pid"));
    let mock_pid = wait_for_pid_record(&mock_record);

    pact_mock_service()
        .args(["control-stop", "--port", &port.to_string()])
        .arg("--pid-dir")
        .arg(&pid_dir)
        .assert()
        .success();

    wait_for_path_removed(&mock_record);
    wait_for_process_exit(mock_pid);
}
