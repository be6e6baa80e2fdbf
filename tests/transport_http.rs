//! HTTP contract tests for the managed transport against a loopback stub.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use artifact_reputation_scanner::core::config::ApiConfig;
use artifact_reputation_scanner::scanner::model::EngineCategory;
use artifact_reputation_scanner::transport::managed::ManagedTransport;
use artifact_reputation_scanner::transport::{
    LookupOutcome, ReputationTransport, SubmitOutcome, SubmitRoute, UsageCounters,
};

const FINGERPRINT: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

/// One request as seen by the stub.
#[derive(Debug)]
struct Recorded {
    request_line: String,
    api_key: Option<String>,
    body_len: usize,
}

fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

/// Answer one connection per scripted response, then return what was asked.
fn serve(listener: TcpListener, responses: Vec<(u16, String)>) -> JoinHandle<Vec<Recorded>> {
    thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (stream, _) = listener.accept().unwrap();
            seen.push(answer(stream, status, &body));
        }
        seen
    })
}

fn answer(stream: TcpStream, status: u16, body: &str) -> Recorded {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut api_key = None;
    let mut content_length = 0usize;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "x-apikey" => api_key = Some(value.to_string()),
                "content-length" => content_length = value.parse().unwrap_or(0),
                "transfer-encoding" => chunked = value.eq_ignore_ascii_case("chunked"),
                _ => {}
            }
        }
    }

    let body_len = if chunked {
        read_chunked(&mut reader)
    } else {
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).unwrap();
        buf.len()
    };

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        _ => "Error",
    };
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
    .unwrap();
    stream.flush().unwrap();

    Recorded {
        request_line: request_line.trim_end().to_string(),
        api_key,
        body_len,
    }
}

fn read_chunked(reader: &mut BufReader<TcpStream>) -> usize {
    let mut total = 0;
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).unwrap();
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        let mut chunk = vec![0u8; size + 2];
        reader.read_exact(&mut chunk).unwrap();
        if size == 0 {
            return total;
        }
        total += size;
    }
}

fn transport(base_url: &str, usage: &Arc<UsageCounters>) -> ManagedTransport {
    let api = ApiConfig {
        base_url: base_url.to_string(),
        lookup_timeout_secs: 5,
        upload_timeout_secs: 5,
        large_upload_timeout_secs: 5,
        ..ApiConfig::default()
    };
    ManagedTransport::new(&api, "test-key", Arc::clone(usage)).unwrap()
}

fn sample_file(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("sample.apk");
    std::fs::write(&path, vec![7u8; 2048]).unwrap();
    path
}

const FOUND_BODY: &str = r#"{"data":{"attributes":{
    "last_analysis_stats":{"malicious":1,"suspicious":0,"undetected":60,"harmless":0},
    "last_analysis_results":{
        "EngineX":{"category":"malicious","engine_name":"EngineX","result":"Trojan.Generic","method":"blacklist"},
        "EngineZ":{"category":"undetected","engine_name":"EngineZ","result":null}
    }}}}"#;

#[test]
fn lookup_found_parses_verdicts_and_sends_key() {
    let (listener, base) = bind();
    let server = serve(listener, vec![(200, FOUND_BODY.to_string())]);
    let usage = Arc::new(UsageCounters::default());

    let outcome = transport(&base, &usage).lookup(FINGERPRINT);
    let seen = server.join().unwrap();

    let LookupOutcome::Found(report) = outcome else {
        panic!("expected found, got {outcome:?}");
    };
    assert_eq!(report.stats.malicious, 1);
    assert_eq!(report.verdicts.len(), 1);
    assert_eq!(report.verdicts[0].engine, "EngineX");
    assert_eq!(report.verdicts[0].category, EngineCategory::Malicious);
    assert_eq!(
        seen[0].request_line,
        format!("GET /files/{FINGERPRINT} HTTP/1.1")
    );
    assert_eq!(seen[0].api_key.as_deref(), Some("test-key"));
    assert_eq!(usage.snapshot().managed_calls, 1);
}

#[test]
fn lookup_maps_404_and_429() {
    let (listener, base) = bind();
    let server = serve(
        listener,
        vec![
            (404, r#"{"error":{"code":"NotFoundError"}}"#.to_string()),
            (429, r#"{"error":{"code":"QuotaExceededError"}}"#.to_string()),
        ],
    );
    let usage = Arc::new(UsageCounters::default());
    let managed = transport(&base, &usage);

    assert_eq!(managed.lookup(FINGERPRINT), LookupOutcome::NotFound);
    assert_eq!(managed.lookup(FINGERPRINT), LookupOutcome::RateLimited);
    server.join().unwrap();

    let snapshot = usage.snapshot();
    assert_eq!(snapshot.managed_calls, 2);
    assert_eq!(snapshot.rate_limits, 1);
}

#[test]
fn lookup_server_error_is_error_outcome() {
    let (listener, base) = bind();
    let server = serve(listener, vec![(500, "oops".to_string())]);
    let usage = Arc::new(UsageCounters::default());

    let outcome = transport(&base, &usage).lookup(FINGERPRINT);
    server.join().unwrap();

    assert!(matches!(outcome, LookupOutcome::Error { ref detail } if detail.contains("500")));
    assert_eq!(usage.snapshot().errors, 1);
}

#[test]
fn direct_submit_posts_file_and_returns_handle() {
    let dir = tempfile::tempdir().unwrap();
    let file = sample_file(dir.path());
    let (listener, base) = bind();
    let server = serve(
        listener,
        vec![(200, r#"{"data":{"type":"analysis","id":"an-42"}}"#.to_string())],
    );
    let usage = Arc::new(UsageCounters::default());

    let outcome = transport(&base, &usage).submit(&file, SubmitRoute::Direct);
    let seen = server.join().unwrap();

    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            handle: Some("an-42".to_string())
        }
    );
    assert_eq!(seen[0].request_line, "POST /files HTTP/1.1");
    assert!(seen[0].body_len > 2048);
}

#[test]
fn large_upload_fetches_url_then_posts_there() {
    let dir = tempfile::tempdir().unwrap();
    let file = sample_file(dir.path());
    let (listener, base) = bind();
    let upload_url = format!("{base}/upload-target/xyz");
    let server = serve(
        listener,
        vec![
            (200, format!(r#"{{"data":"{upload_url}"}}"#)),
            (200, r#"{"data":{"id":"an-big"}}"#.to_string()),
        ],
    );
    let usage = Arc::new(UsageCounters::default());

    let outcome = transport(&base, &usage).submit(&file, SubmitRoute::LargeUpload);
    let seen = server.join().unwrap();

    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            handle: Some("an-big".to_string())
        }
    );
    assert_eq!(seen[0].request_line, "GET /files/upload_url HTTP/1.1");
    assert_eq!(seen[1].request_line, "POST /upload-target/xyz HTTP/1.1");
    assert_eq!(seen[1].api_key.as_deref(), Some("test-key"));
}

#[test]
fn rejected_submission_is_failed() {
    let dir = tempfile::tempdir().unwrap();
    let file = sample_file(dir.path());
    let (listener, base) = bind();
    let server = serve(listener, vec![(413, r#"{"error":"too big"}"#.to_string())]);
    let usage = Arc::new(UsageCounters::default());

    let outcome = transport(&base, &usage).submit(&file, SubmitRoute::Direct);
    server.join().unwrap();

    assert!(matches!(outcome, SubmitOutcome::Failed { ref detail } if detail.contains("413")));
    assert_eq!(usage.snapshot().errors, 1);
}
