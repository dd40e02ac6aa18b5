use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use nomnom_client::{LoadError, SimulationClient, SimulationSource, load_from_path};
use nomnom_core::{AgentKind, GridPos};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/short_run.json")
}

/// Answer exactly one HTTP request with the given status line and body.
fn serve_once(status: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut line = String::new();
        while reader.read_line(&mut line).expect("read request") > 0 {
            if line == "\r\n" {
                break;
            }
            line.clear();
        }
        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).expect("write response");
    });
    format!("http://{addr}/")
}

#[test]
fn fixture_loads_from_disk() {
    let record = load_from_path(fixture_path()).expect("fixture");
    assert_eq!(record.total_steps, 11);
    assert_eq!(record.steps.len(), 11);
    assert_eq!(record.storage_location, GridPos::new(12, 4));

    let first = record.first_step().expect("first step");
    assert_eq!(first.count_of(AgentKind::Collector), 3);
    assert_eq!(first.count_of(AgentKind::Explorer), 2);
    assert_eq!(record.last_step_id(), Some(10));
    assert!(record.steps[3].food_picked.is_some_and(|pickup| pickup.picked));
    assert!(record.steps[4].food_picked.is_none());
}

#[test]
fn fetch_decodes_served_record() {
    let body = std::fs::read_to_string(fixture_path()).expect("fixture");
    let url = serve_once("200 OK", body);
    let client = SimulationClient::with_timeout(url.clone(), Duration::from_secs(10)).expect("client");
    assert_eq!(client.endpoint(), url);

    let record = client.fetch().expect("fetch");
    assert_eq!(record.steps.len(), 11);
}

#[test]
fn non_success_status_is_reported() {
    let url = serve_once("503 Service Unavailable", String::from("{}"));
    let source = SimulationSource::Endpoint(url);
    match source.load() {
        Err(LoadError::Status { status, .. }) => assert_eq!(status, 503),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn garbage_body_is_a_decode_error() {
    let url = serve_once("200 OK", String::from("<html>not json</html>"));
    let client = SimulationClient::new(url).expect("client");
    assert!(matches!(client.fetch(), Err(LoadError::Decode(_))));
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let client = SimulationClient::with_timeout(
        format!("http://127.0.0.1:{port}/"),
        Duration::from_secs(5),
    )
    .expect("client");
    let err = client.fetch().expect_err("nothing listening");
    assert!(matches!(err, LoadError::Transport { .. }), "got {err}");
}
