//! End to end tests. Real query subprocesses, stubbed with /bin/sh scripts,
//! and one run over a real socket.
//
use common::{Dispatcher, Reply, ServerConfig, ServerRequest, TemplateRenderer};
use common::{serve, test_logger};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const GOOD_FORM: &str = "timestamp=2023-01-01T00%3A00%3A00Z&protocol_version=v4&source_port=8080";

/// Document root with a form page and the reply template.
fn docroot() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("index.html"), "<form>query</form>").expect("write");
    std::fs::write(
        dir.path().join("reply.html"),
        "<html><body><pre>{{device}}</pre></body></html>",
    )
    .expect("write");
    dir
}

/// Dispatcher whose query tool is a shell script. The script sees the query arguments as $1 $2 $3.
fn dispatcher(root: &Path, script: &str, timeout: Duration) -> Dispatcher {
    let mut config = ServerConfig::defaults().expect("defaults");
    config.base_dir = root.to_path_buf();
    config.template_file = root.join("reply.html");
    config.query_binary = PathBuf::from("/bin/sh");
    config.query_flags = vec!["-c".to_string(), script.to_string(), "query".to_string()];
    config.query_timeout = timeout;
    let renderer = TemplateRenderer::load(&config.template_file).expect("template");
    Dispatcher::new(&config, renderer)
}

fn post(body: &str) -> ServerRequest {
    ServerRequest {
        method: "POST".to_string(),
        path: "/".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: body.as_bytes().to_vec(),
    }
}

fn get(path: &str) -> ServerRequest {
    ServerRequest {
        method: "GET".to_string(),
        path: path.to_string(),
        content_type: None,
        body: Vec::new(),
    }
}

fn page(reply: Reply) -> (u16, String) {
    match reply {
        Reply::Page { status, body } => (status, body),
        Reply::File { .. } => panic!("expected a page"),
    }
}

fn file_text(reply: Reply) -> String {
    match reply {
        Reply::File { mut file, .. } => {
            let mut s = String::new();
            file.read_to_string(&mut s).expect("read");
            s
        }
        Reply::Page { status, body } => panic!("expected a file, got {} {}", status, body),
    }
}

#[test]
fn valid_post_renders_device() {
    test_logger();
    let root = docroot();
    let d = dispatcher(
        root.path(),
        r#"[ "$1" = "2023-01-01T00:00:00Z" ] && [ "$2" = "v4" ] && [ "$3" = "8080" ] || exit 3
echo "noise STARTdevice-infoEND more noise""#,
        Duration::from_secs(5),
    );
    let (status, body) = page(d.dispatch(&post(GOOD_FORM)));
    assert_eq!(status, 200);
    assert!(body.contains("<pre>device-info</pre>"), "body: {}", body);
}

#[test]
fn v6_post_passes_address() {
    test_logger();
    let root = docroot();
    let d = dispatcher(
        root.path(),
        r#"[ "$2" = "v6" ] && [ "$3" = "2001:db8::1" ] || exit 3
echo "START$3END""#,
        Duration::from_secs(5),
    );
    let (status, body) = page(d.dispatch(&post(
        "timestamp=2023-01-01T00%3A00%3A00Z&protocol_version=v6&source_address=2001%3Adb8%3A%3A1",
    )));
    assert_eq!(status, 200);
    assert!(body.contains("2001:db8::1"));
}

#[test]
fn invalid_timestamp_never_runs_the_tool() {
    test_logger();
    let root = docroot();
    let marker = root.path().join("ran");
    let script = format!("touch '{}'; echo STARTxEND", marker.display());
    let d = dispatcher(root.path(), &script, Duration::from_secs(5));
    let (status, body) = page(d.dispatch(&post(
        "timestamp=not-a-date&protocol_version=v4&source_port=8080",
    )));
    assert_eq!(status, 400);
    assert!(body.contains("timestamp"));
    //  Shell metacharacters are refused the same way.
    let (status, _) = page(d.dispatch(&post(
        "timestamp=2023-01-01T00%3A00%3A00Z&protocol_version=v4&source_port=80%3Brm",
    )));
    assert_eq!(status, 400);
    assert!(!marker.exists(), "query tool ran for an invalid request");
}

#[test]
fn failing_tool_is_bad_gateway() {
    test_logger();
    let root = docroot();
    let d = dispatcher(
        root.path(),
        "echo 'secret connection string' >&2; exit 1",
        Duration::from_secs(5),
    );
    let (status, body) = page(d.dispatch(&post(GOOD_FORM)));
    assert_eq!(status, 502);
    assert!(!body.contains("secret"));
}

#[test]
fn missing_end_marker_is_bad_gateway() {
    test_logger();
    let root = docroot();
    let d = dispatcher(root.path(), "echo STARTpartial", Duration::from_secs(5));
    let (status, body) = page(d.dispatch(&post(GOOD_FORM)));
    assert_eq!(status, 502);
    assert!(!body.contains("partial"));
}

#[test]
fn slow_tool_times_out_and_is_killed() {
    test_logger();
    let root = docroot();
    let pidfile = root.path().join("pid");
    let script = format!("echo $$ > '{}'; exec sleep 30", pidfile.display());
    let d = dispatcher(root.path(), &script, Duration::from_millis(300));
    let started = Instant::now();
    let (status, _) = page(d.dispatch(&post(GOOD_FORM)));
    assert_eq!(status, 504);
    assert!(started.elapsed() < Duration::from_secs(10));
    let pid = std::fs::read_to_string(&pidfile).expect("pid written");
    if Path::new("/proc/self").exists() {
        assert!(!Path::new(&format!("/proc/{}", pid.trim())).exists());
    }
}

#[test]
fn background_job_does_not_hold_the_request() {
    test_logger();
    let root = docroot();
    let d = dispatcher(
        root.path(),
        "sleep 30 & echo STARTbackground-okEND",
        Duration::from_millis(500),
    );
    let started = Instant::now();
    let (status, body) = page(d.dispatch(&post(GOOD_FORM)));
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert_eq!(status, 200);
    assert!(body.contains("<pre>background-ok</pre>"));
}

#[test]
fn root_and_index_are_the_same_file() {
    test_logger();
    let root = docroot();
    let d = dispatcher(root.path(), "exit 1", Duration::from_secs(5));
    let a = file_text(d.dispatch(&get("/")));
    let b = file_text(d.dispatch(&get("/index.html")));
    assert_eq!(a, b);
    assert_eq!(a, "<form>query</form>");
    //  No way out of the document root.
    assert_eq!(d.dispatch(&get("/../../../../etc/passwd")).status(), 404);
    assert_eq!(d.dispatch(&get("/%2e%2e/%2e%2e/etc/passwd")).status(), 404);
}

/// Send one raw HTTP/1.0 request, return the whole response.
fn exchange(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("timeout");
    stream.write_all(request.as_bytes()).expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read");
    response
}

#[test]
fn over_the_wire() {
    test_logger();
    let root = docroot();
    let d = dispatcher(root.path(), "echo STARTwired-deviceEND", Duration::from_secs(5));
    let server = Arc::new(tiny_http::Server::http("127.0.0.1:0").expect("bind"));
    let addr = server.server_addr().to_ip().expect("ip listener");
    let dispatcher = Arc::new(d);
    //  Workers run until the test process exits.
    std::thread::spawn(move || serve(server, dispatcher, 2));

    let response = exchange(addr, "GET / HTTP/1.0\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200") || response.starts_with("HTTP/1.0 200"));
    assert!(response.contains("<form>query</form>"));

    let response = exchange(
        addr,
        &format!(
            "POST / HTTP/1.0\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            GOOD_FORM.len(),
            GOOD_FORM
        ),
    );
    assert!(response.contains(" 200 "), "response: {}", response);
    assert!(response.contains("<pre>wired-device</pre>"));

    let response = exchange(addr, "GET /missing.html HTTP/1.0\r\n\r\n");
    assert!(response.contains(" 404 "), "response: {}", response);
}
