#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use ian_packets::builtin::packet_type;
use ian_packets::{encode_packet, Origin, Version};

fn welcome_payload(message: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.put_i32_le(message.len() as i32);
    payload.put_slice(message.as_bytes());
    payload
}

fn version_payload(version: Version) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.put_i32_le(0);
    payload.put_f32_le(2.0);
    payload.put_i32_le(version.major as i32);
    payload.put_i32_le(version.minor as i32);
    payload.put_i32_le(version.patch as i32);
    payload
}

/// Accept one client, send the greeting and version, then read until the
/// client hangs up.
fn spawn_server(version: Version) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("local addr").port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("client should connect");
        let mut wire = BytesMut::new();
        encode_packet(
            Origin::Server,
            packet_type::PLAIN_TEXT_GREETING,
            &welcome_payload("Welcome aboard"),
            &mut wire,
        )
        .expect("greeting should encode");
        encode_packet(
            Origin::Server,
            packet_type::CONNECTED,
            &version_payload(version),
            &mut wire,
        )
        .expect("version should encode");
        stream.write_all(&wire).expect("handshake should send");

        drain(&mut stream);
    });

    (port, handle)
}

fn drain(stream: &mut TcpStream) {
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout should set");
    let mut buf = [0u8; 1024];
    while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
}

fn ian(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ian"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("ian should run")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

#[test]
fn probe_prints_handshake() {
    let (port, server) = spawn_server(Version::new(2, 7, 1));
    let address = format!("127.0.0.1:{port}");

    let output = ian(&["probe", &address, "--timeout", "3s", "--format", "json"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    let probe = &lines[0];
    assert_eq!(probe["address"], address.as_str());
    assert_eq!(probe["server_version"], "2.7.1");
    assert_eq!(probe["supported"], true);
    assert_eq!(probe["welcome"], "Welcome aboard");

    server.join().expect("server thread should finish");
}

#[test]
fn probe_reports_unsupported_version() {
    let (port, server) = spawn_server(Version::new(2, 1, 0));
    let address = format!("127.0.0.1:{port}");

    let output = ian(&["probe", &address, "--timeout", "3s", "--format", "json"]);
    assert_eq!(output.status.code(), Some(4));

    let lines = json_lines(&output);
    assert_eq!(lines[0]["server_version"], "2.1.0");
    assert_eq!(lines[0]["supported"], false);

    server.join().expect("server thread should finish");
}

#[test]
fn probe_refused_connection_is_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        listener.local_addr().expect("local addr").port()
    };

    let output = ian(&["probe", &format!("127.0.0.1:{port}"), "--timeout", "2s"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn probe_rejects_bad_address() {
    let output = ian(&["probe", "127.0.0.1:notaport"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn listen_stops_after_count() {
    let (port, server) = spawn_server(Version::new(2, 7, 1));
    let address = format!("127.0.0.1:{port}");

    let output = ian(&[
        "listen",
        &address,
        "--count",
        "2",
        "--packets-only",
        "--format",
        "json",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = json_lines(&output);
    let names: Vec<&str> = lines
        .iter()
        .map(|line| line["name"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(names, ["WelcomePacket", "VersionPacket"]);
    assert!(lines.iter().all(|line| line["kind"] == "packet"));

    server.join().expect("server thread should finish");
}

#[test]
fn listen_reports_events_until_remote_close() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("client should connect");
        let mut wire = BytesMut::new();
        encode_packet(
            Origin::Server,
            packet_type::CONNECTED,
            &version_payload(Version::new(2, 7, 1)),
            &mut wire,
        )
        .expect("version should encode");
        stream.write_all(&wire).expect("version should send");
        thread::sleep(Duration::from_millis(200));
    });

    let output = ian(&["listen", &format!("127.0.0.1:{port}"), "--format", "json"]);
    assert!(output.status.success());

    let lines = json_lines(&output);
    let names: Vec<&str> = lines
        .iter()
        .map(|line| line["name"].as_str().unwrap_or_default())
        .collect();
    assert!(names.contains(&"ConnectionSuccess"));
    assert_eq!(names.last(), Some(&"Disconnect"));
    assert!(names.contains(&"VersionPacket"));

    server.join().expect("server thread should finish");
}

#[test]
fn version_prints_package_version() {
    let output = ian(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("ian {}", env!("CARGO_PKG_VERSION")));

    let extended = ian(&["version", "--extended"]);
    let stdout = String::from_utf8_lossy(&extended.stdout);
    assert!(stdout.contains("protocol_min: 2.3.0"));
    assert!(stdout.contains("default_port: 2010"));
}
