// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parse_head_extracts_status_and_headers() {
    let head = "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 74\r\n\r\n";
    let (status, headers) = parse_head(head).unwrap();
    assert_eq!(status, 201);
    assert_eq!(headers.get("content-type").map(String::as_str), Some("application/json"));
    assert_eq!(headers.get("content-length").map(String::as_str), Some("74"));
}

#[test]
fn parse_head_accepts_upgrade_response() {
    let head = "HTTP/1.1 101 UPGRADED\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\n";
    let (status, headers) = parse_head(head).unwrap();
    assert_eq!(status, 101);
    assert_eq!(headers.get("upgrade").map(String::as_str), Some("tcp"));
}

#[test]
fn parse_head_rejects_garbage() {
    assert!(parse_head("not http at all\r\n\r\n").is_err());
}

#[test]
fn chunked_decoding_reassembles_the_body() {
    let raw = b"7\r\n{\"Id\":\"\r\n4\r\nabc\"\r\n0\r\n\r\n";
    assert_eq!(decode_chunked(raw).unwrap(), b"{\"Id\":\"abc\"");
}

#[test]
fn chunked_decoding_rejects_truncation() {
    let raw = b"ff\r\nshort\r\n";
    assert!(decode_chunked(raw).is_none());
}

#[test]
fn connect_error_names_the_socket() {
    let api = EngineApi::new("/nonexistent/docker.sock");
    let err = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(api.create_exec("c", &["/bin/sh"]))
        .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/docker.sock"));
}
