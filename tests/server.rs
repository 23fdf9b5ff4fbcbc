//! End-to-end tests against a live server on a real TCP socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use threadhttp::{ContentType, Method, Response, Server, StatusCode};

fn start_server(port: u16) {
    thread::spawn(move || {
        let mut server = Server::new(1, 2);
        server.register_handler(Method::Get, "/", |_req| {
            Ok(Response::new(StatusCode::Ok, ContentType::PlainText, &b"hi"[..]))
        });
        server.register_handler(Method::Post, "/echo", |req| {
            Ok(Response::new(StatusCode::Ok, ContentType::PlainText, req.body))
        });
        server.register_handler(Method::Get, "/slow", |req| {
            let odd = req
                .query_param("n")
                .and_then(|n| n.parse::<u32>().ok())
                .map(|n| n % 2 == 1)
                .unwrap_or(false);
            if odd {
                thread::sleep(Duration::from_millis(200));
            }
            Ok(Response::new(
                StatusCode::Ok,
                ContentType::PlainText,
                req.query_param("n").unwrap_or("").as_bytes().to_vec(),
            ))
        });
        let _ = server.go(port);
    });
    // Give the Dispatches and listener a moment to come up.
    thread::sleep(Duration::from_millis(150));
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_millis(800)))
        .unwrap();
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

/// Reads until the socket goes quiet for one read-timeout window.
fn read_available(stream: &mut TcpStream, _at_least: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    out
}

#[test]
fn get_root_returns_plaintext_body() {
    start_server(17801);
    let mut stream = connect(17801);
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let response = read_available(&mut stream, 1);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.ends_with("hi"), "{text}");
}

#[test]
fn post_echo_round_trips_body() {
    start_server(17802);
    let mut stream = connect(17802);
    let body = b"hello world";
    let request = format!(
        "POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        String::from_utf8_lossy(body)
    );
    stream.write_all(request.as_bytes()).unwrap();
    let response = read_available(&mut stream, 1);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.ends_with("hello world"), "{text}");
}

#[test]
fn unregistered_route_returns_404() {
    start_server(17803);
    let mut stream = connect(17803);
    stream
        .write_all(b"GET /does-not-exist HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_available(&mut stream, 1);
    let text = String::from_utf8_lossy(&response);
    assert!(
        text.starts_with("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"),
        "{text}"
    );
}

#[test]
fn pipelined_requests_preserve_order_under_worker_reordering() {
    start_server(17804);
    let mut stream = connect(17804);

    let mut request = String::new();
    for n in 0..6 {
        request.push_str(&format!("GET /slow?n={n} HTTP/1.1\r\nHost: x\r\n\r\n"));
    }
    stream.write_all(request.as_bytes()).unwrap();

    // Each response body is the single digit we sent; six full
    // "HTTP/1.1 200 OK\r\n...Content-Length: 1\r\n\r\nN" responses.
    let response = read_available(&mut stream, 6 * 60);
    let text = String::from_utf8_lossy(&response);
    let bodies: Vec<&str> = text
        .split("HTTP/1.1 200 OK")
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end().rsplit("\r\n\r\n").next().unwrap())
        .collect();
    assert_eq!(bodies, vec!["0", "1", "2", "3", "4", "5"]);
}

#[test]
fn malformed_request_closes_connection() {
    start_server(17805);
    let mut stream = connect(17805);
    stream.write_all(b"FOO / HTTP/1.1\r\n\r\n").unwrap();
    let response = read_available(&mut stream, 1);
    // Best-effort 400, or the peer simply closes; either is acceptable,
    // but the connection must not hang open indefinitely.
    if !response.is_empty() {
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request"), "{text}");
    }
}
