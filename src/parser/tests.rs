use super::*;

#[test]
fn parses_get_with_query_and_headers() {
    let mut parser = Parser::new();
    parser.process(
        b"GET /widgets?id=7&name=a%20b HTTP/1.1\r\n\
          Host: example.test\r\n\
          X-Trace: abc\r\n\
          \r\n",
    );
    let mut requests = parser.take_requests();
    assert_eq!(requests.len(), 1);
    let req = requests.remove(0);
    assert_eq!(req.method, Method::Get);
    assert_eq!(req.endpoint, "/widgets");
    assert_eq!(req.query_param("id"), Some("7"));
    assert_eq!(req.query_param("name"), Some("a%20b"));
    assert_eq!(req.header("Host"), Some("example.test"));
    assert_eq!(req.header("X-Trace"), Some("abc"));
    assert!(req.body.is_empty());
    assert!(!parser.is_error());
}

#[test]
fn parses_post_with_body() {
    let mut parser = Parser::new();
    parser.process(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
    let mut requests = parser.take_requests();
    assert_eq!(requests.len(), 1);
    let req = requests.remove(0);
    assert_eq!(req.method, Method::Post);
    assert_eq!(req.endpoint, "/echo");
    assert_eq!(req.body, b"hello");
    assert!(!parser.is_error());
}

#[test]
fn parses_across_arbitrary_byte_splits() {
    let whole: &[u8] = b"PUT /items/42 HTTP/1.1\r\nContent-Length: 3\r\n\r\nfoo";
    for split in 0..whole.len() {
        let mut parser = Parser::new();
        parser.process(&whole[..split]);
        parser.process(&whole[split..]);
        let mut requests = parser.take_requests();
        assert_eq!(requests.len(), 1, "failed at split {split}");
        let req = requests.remove(0);
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.endpoint, "/items/42");
        assert_eq!(req.body, b"foo");
        assert!(!parser.is_error(), "failed at split {split}");
    }
}

#[test]
fn parses_one_byte_at_a_time() {
    let whole: &[u8] = b"DELETE /items/1 HTTP/1.1\r\nX: y\r\n\r\n";
    let mut parser = Parser::new();
    for &byte in whole {
        parser.process(&[byte]);
    }
    let mut requests = parser.take_requests();
    assert_eq!(requests.len(), 1);
    let req = requests.remove(0);
    assert_eq!(req.method, Method::Delete);
    assert_eq!(req.endpoint, "/items/1");
    assert_eq!(req.header("X"), Some("y"));
}

#[test]
fn unknown_method_sets_error() {
    let mut parser = Parser::new();
    parser.process(b"FOO / HTTP/1.1\r\n\r\n");
    assert!(parser.is_error());
}

#[test]
fn non_numeric_content_length_sets_error_but_still_commits() {
    let mut parser = Parser::new();
    parser.process(b"POST /x HTTP/1.1\r\nContent-Length: not-a-number\r\n\r\n");
    let requests = parser.take_requests();
    assert_eq!(requests.len(), 1);
    assert!(parser.is_error());
}

#[test]
fn pipelined_requests_in_one_buffer() {
    let mut parser = Parser::new();
    parser.process(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n");
    let requests = parser.take_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].endpoint, "/a");
    assert_eq!(requests[1].endpoint, "/b");
}

#[test]
fn fresh_flag_tracks_activity() {
    let mut parser = Parser::new();
    assert!(parser.is_fresh());
    parser.process(b"G");
    assert!(!parser.is_fresh());
    parser.process(b"ET / HTTP/1.1\r\n\r\n");
    assert!(parser.is_fresh());
}

#[test]
fn reset_preserves_untaken_requests() {
    let mut parser = Parser::new();
    parser.process(b"GET /a HTTP/1.1\r\n\r\n");
    parser.reset();
    let requests = parser.take_requests();
    assert_eq!(requests.len(), 1);
    assert!(!parser.is_error());
    assert!(parser.is_fresh());
}

#[test]
fn clear_drops_untaken_requests() {
    let mut parser = Parser::new();
    parser.process(b"GET /a HTTP/1.1\r\n\r\n");
    parser.clear();
    assert!(parser.take_requests().is_empty());
}

#[test]
fn multiple_query_pairs_and_header_case_is_preserved() {
    let mut parser = Parser::new();
    parser.process(b"GET /s?a=1&b=2 HTTP/1.1\r\nx-Custom-Header: Value\r\n\r\n");
    let mut requests = parser.take_requests();
    let req = requests.remove(0);
    assert_eq!(req.query_param("a"), Some("1"));
    assert_eq!(req.query_param("b"), Some("2"));
    assert_eq!(req.header("x-Custom-Header"), Some("Value"));
    assert_eq!(req.header("X-Custom-Header"), None);
}
