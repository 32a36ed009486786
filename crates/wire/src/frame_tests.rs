// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format tests: length-prefix framing, frames, and hellos.

use super::*;
use kr_core::TaskId;

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original).await.expect("write failed");

    // write_message adds a 4-byte length prefix
    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.expect("read failed");
    assert_eq!(read_back, original);
}

#[tokio::test]
async fn frame_roundtrip() {
    let frame = Frame::data(7, TaskId(7_316_926_523_823_489_024), b"ssh bytes".to_vec());

    let mut buffer = Vec::new();
    write_frame(&mut buffer, &frame).await.expect("write failed");

    let mut cursor = std::io::Cursor::new(buffer);
    let back = read_frame(&mut cursor).await.expect("read failed");
    assert_eq!(back, frame);
}

#[tokio::test]
async fn control_frames_carry_empty_payloads() {
    for frame in [Frame::open(1, TaskId(5)), Frame::close(2, TaskId(5))] {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &frame).await.expect("write failed");
        let mut cursor = std::io::Cursor::new(buffer);
        let back = read_frame(&mut cursor).await.expect("read failed");
        assert_eq!(back, frame);
        assert!(back.payload.is_empty());
    }
}

#[tokio::test]
async fn err_frame_carries_diagnostic() {
    let frame = Frame::err(3, TaskId(9), "dial failed");
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &frame).await.expect("write failed");
    let mut cursor = std::io::Cursor::new(buffer);
    let back = read_frame(&mut cursor).await.expect("read failed");
    assert_eq!(back.flag, ChannelFlag::Err);
    assert_eq!(String::from_utf8(back.payload).expect("utf8"), "dial failed");
}

#[tokio::test]
async fn oversized_frames_are_rejected_on_both_sides() {
    let frame = Frame::data(1, TaskId(1), vec![0u8; MAX_FRAME_PAYLOAD + 1]);
    let mut buffer = Vec::new();
    assert!(matches!(
        write_frame(&mut buffer, &frame).await,
        Err(FrameError::TooLarge(_))
    ));

    // A length prefix beyond the cap is rejected before allocation.
    let mut evil = Vec::new();
    evil.extend_from_slice(&(10_000_000u32).to_be_bytes());
    let mut cursor = std::io::Cursor::new(evil);
    assert!(matches!(read_message(&mut cursor).await, Err(FrameError::TooLarge(_))));
}

#[tokio::test]
async fn truncated_stream_reports_connection_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    assert!(matches!(read_frame(&mut cursor).await, Err(FrameError::ConnectionClosed)));
}

#[tokio::test]
async fn unknown_flag_is_an_error() {
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&1u64.to_be_bytes());
    body.push(99);

    let mut framed = Vec::new();
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(&body);

    let mut cursor = std::io::Cursor::new(framed);
    assert!(matches!(read_frame(&mut cursor).await, Err(FrameError::BadFlag(99))));
}

#[tokio::test]
async fn hello_roundtrip() {
    for hello in [
        ProxyHello::Worker { hostname: "n1".to_string() },
        ProxyHello::Client { task_id: TaskId(42) },
    ] {
        let mut buffer = Vec::new();
        write_hello(&mut buffer, &hello).await.expect("write failed");
        let mut cursor = std::io::Cursor::new(buffer);
        let back = read_hello(&mut cursor).await.expect("read failed");
        assert_eq!(back, hello);
    }
}

#[test]
fn hello_wire_shape_is_role_tagged() {
    let json = serde_json::to_value(ProxyHello::Client { task_id: TaskId(42) }).expect("json");
    assert_eq!(json["role"], "client");
    assert_eq!(json["task_id"], 42);
}
