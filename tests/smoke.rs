//! Smoke tests -- verify the binary runs and streams a file end to end.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use assert_cmd::Command;

fn source_file(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();
    tmp
}

/// Accept `n` connections and collect each payload.
fn sink(n: usize) -> (u16, thread::JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let readers: Vec<_> = (0..n)
            .map(|_| {
                let (mut socket, _) = listener.accept().unwrap();
                thread::spawn(move || {
                    let mut received = Vec::new();
                    socket.read_to_end(&mut received).unwrap();
                    received
                })
            })
            .collect();
        readers.into_iter().map(|r| r.join().unwrap()).collect()
    });
    (port, handle)
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("file2tcp")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Stream a file to a TCP endpoint"))
        .stdout(predicates::str::contains("--conc"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("file2tcp")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("file2tcp"));
}

#[test]
fn test_missing_file_fails() {
    Command::cargo_bin("file2tcp")
        .unwrap()
        .env_remove("FILE2TCP_CONFIG")
        .args(["-p", "24224"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("no source file given"));
}

#[test]
fn test_sends_abc() {
    let src = source_file(b"abc");
    let (port, receiver) = sink(1);

    Command::cargo_bin("file2tcp")
        .unwrap()
        .env_remove("FILE2TCP_CONFIG")
        .arg("-f")
        .arg(src.path())
        .args(["-h", "127.0.0.1", "-p", &port.to_string()])
        .assert()
        .success()
        .stdout(predicates::str::contains("100.00% (3/3 bytes)"))
        .stdout(predicates::str::contains("worker #0: completed"));

    assert_eq!(receiver.join().unwrap(), vec![b"abc".to_vec()]);
}

#[test]
fn test_concurrent_workers_json_report() {
    let payload = vec![42u8; 64 * 1024];
    let src = source_file(&payload);
    let (port, receiver) = sink(2);

    let output = Command::cargo_bin("file2tcp")
        .unwrap()
        .env_remove("FILE2TCP_CONFIG")
        .arg("-f")
        .arg(src.path())
        .args(["-p", &port.to_string(), "-c", "2", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["concurrency"], 2);
    assert_eq!(report["total_bytes"], payload.len() as u64 * 2);
    assert_eq!(report["workers"][0]["state"], "completed");
    assert_eq!(report["workers"][1]["state"], "completed");

    for received in receiver.join().unwrap() {
        assert_eq!(received, payload);
    }
}

#[test]
fn test_connect_refused_reports_phase() {
    let src = source_file(b"abc");
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    Command::cargo_bin("file2tcp")
        .unwrap()
        .env_remove("FILE2TCP_CONFIG")
        .arg("-f")
        .arg(src.path())
        .args(["-p", &port.to_string()])
        .assert()
        .failure()
        .stdout(predicates::str::contains("failed in connect phase"));
}
