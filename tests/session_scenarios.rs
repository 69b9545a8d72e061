// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end session scenarios driven over a real loopback UDP socket,
//! standing in for the BE server the spec's scenarios describe.

use std::time::Duration;

use bercon_rs::{cfg::config::BeClientConfig, codec, events::Event, session::SessionHandle};
use tokio::{net::UdpSocket, time::timeout};

fn cfg(port: u16) -> BeClientConfig {
    BeClientConfig {
        host: "127.0.0.1".into(),
        port,
        password: "secret".into(),
        auto_reconnect: false,
        player_update_interval_ms: 5_000,
        idle_timeout_ms: 10_000,
        resend_interval_ms: 2_000,
        part_quiet_interval_ms: 750,
        max_attempts: 5,
    }
}

async fn next_event(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within timeout")
        .expect("event stream open")
}

#[tokio::test]
async fn s1_login_success_emits_connected_and_sends_roster_poll() {
    let server = UdpSocket::bind("127.0.0.1:0").await.expect("bind server");
    let addr = server.local_addr().expect("addr");

    let session = SessionHandle::new(cfg(addr.port()));
    let mut events = session.subscribe();
    assert!(session.connect().await);

    let mut buf = [0u8; 256];
    let (n, client_addr) = server.recv_from(&mut buf).await.expect("recv login");
    assert!(matches!(codec::decode(&buf[..n]), Ok(codec::Frame::Login(_))));

    let wire = codec::encode_login_status_for_test(true);
    server.send_to(&wire, client_addr).await.expect("send login ack");

    assert_eq!(next_event(&mut events).await, Event::Connected);

    let (n, _) = server.recv_from(&mut buf).await.expect("recv first command");
    match codec::decode(&buf[..n]) {
        Ok(codec::Frame::CommandWhole { data, .. }) => assert_eq!(&data[..], b"players"),
        other => panic!("expected the roster poll command, got {other:?}"),
    }
}

#[tokio::test]
async fn s2_login_failure_emits_auth_error_and_aborted_disconnect() {
    let server = UdpSocket::bind("127.0.0.1:0").await.expect("bind server");
    let addr = server.local_addr().expect("addr");

    let session = SessionHandle::new(cfg(addr.port()));
    let mut events = session.subscribe();
    assert!(session.connect().await);

    let mut buf = [0u8; 256];
    let (_, client_addr) = server.recv_from(&mut buf).await.expect("recv login");
    let wire = codec::encode_login_status_for_test(false);
    server.send_to(&wire, client_addr).await.expect("send login reject");

    let error = next_event(&mut events).await;
    assert!(matches!(error, Event::Error { kind, .. } if kind == bercon_rs::events::ErrorKind::Auth));

    let disconnected = next_event(&mut events).await;
    match disconnected {
        Event::Disconnected { aborted, .. } => assert!(aborted),
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn s4_multipart_response_reassembles_for_a_user_command() {
    let server = UdpSocket::bind("127.0.0.1:0").await.expect("bind server");
    let addr = server.local_addr().expect("addr");

    let session = SessionHandle::new(cfg(addr.port()));
    let mut events = session.subscribe();
    assert!(session.connect().await);

    let mut buf = [0u8; 256];
    let (_, client_addr) = server.recv_from(&mut buf).await.expect("recv login");
    let wire = codec::encode_login_status_for_test(true);
    server.send_to(&wire, client_addr).await.expect("send login ack");
    assert_eq!(next_event(&mut events).await, Event::Connected);

    // Drain the roster poll the session sends right after login, and
    // answer it with an empty (single-part) snapshot so it doesn't
    // stay in flight ahead of our user command.
    let (n, _) = server.recv_from(&mut buf).await.expect("recv roster poll");
    let seq = match codec::decode(&buf[..n]) {
        Ok(codec::Frame::CommandWhole { seq, .. }) => seq,
        other => panic!("expected whole command, got {other:?}"),
    };
    let wire = codec::encode_command(seq, b"Players on server:\nh\n--\nl\n");
    server.send_to(&wire, client_addr).await.expect("send roster reply");
    let _ = next_event(&mut events).await; // Players(snapshot)

    session.send_command("say -1 hi");
    let (n, _) = server.recv_from(&mut buf).await.expect("recv user command");
    let seq = match codec::decode(&buf[..n]) {
        Ok(codec::Frame::CommandWhole { seq, .. }) => seq,
        other => panic!("expected whole command, got {other:?}"),
    };

    // Deliver the two parts out of order; the assembled payload must
    // still read in index order.
    let part1 = codec::encode_command_part_for_test(seq, 2, 1, b" world");
    server.send_to(&part1, client_addr).await.expect("send part 1");

    let part0 = codec::encode_command_part_for_test(seq, 2, 0, b"hello");
    server.send_to(&part0, client_addr).await.expect("send part 0");

    let reply = next_event(&mut events).await;
    match reply {
        Event::CommandResponse { data, .. } => assert_eq!(data, b"hello world".to_vec()),
        other => panic!("expected CommandResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn s5_inline_join_then_leave_through_the_full_actor() {
    let server = UdpSocket::bind("127.0.0.1:0").await.expect("bind server");
    let addr = server.local_addr().expect("addr");

    let session = SessionHandle::new(cfg(addr.port()));
    let mut events = session.subscribe();
    assert!(session.connect().await);

    let mut buf = [0u8; 256];
    let (_, client_addr) = server.recv_from(&mut buf).await.expect("recv login");
    let wire = codec::encode_login_status_for_test(true);
    server.send_to(&wire, client_addr).await.expect("send login ack");
    assert_eq!(next_event(&mut events).await, Event::Connected);

    // Drain and answer the post-login roster poll so the engine is
    // marked ready before the inline sequence arrives.
    let (n, _) = server.recv_from(&mut buf).await.expect("recv roster poll");
    let seq = match codec::decode(&buf[..n]) {
        Ok(codec::Frame::CommandWhole { seq, .. }) => seq,
        other => panic!("expected whole command, got {other:?}"),
    };
    let wire = codec::encode_command(seq, b"Players on server:\nh\n--\nl\n");
    server.send_to(&wire, client_addr).await.expect("send roster reply");
    let _ = next_event(&mut events).await; // Players(snapshot)

    let connecting =
        codec::encode_server_message_for_test(0, "Player #4 Bob (10.0.0.6:2302) connected");
    server.send_to(&connecting, client_addr).await.expect("send connecting");
    let mut ack_buf = [0u8; 256];
    let (n, _) = server.recv_from(&mut ack_buf).await.expect("recv ack 0");
    assert!(matches!(codec::decode(&ack_buf[..n]), Ok(codec::Frame::ServerMessage { seq: 0, .. })));

    let verified = codec::encode_server_message_for_test(
        1,
        "Verified GUID (4444444444444444444444444444abcd) of player #4 Bob",
    );
    server.send_to(&verified, client_addr).await.expect("send verified");
    let (n, _) = server.recv_from(&mut ack_buf).await.expect("recv ack 1");
    assert!(matches!(codec::decode(&ack_buf[..n]), Ok(codec::Frame::ServerMessage { seq: 1, .. })));

    let join = next_event(&mut events).await;
    match join {
        Event::PlayerJoin(p) => {
            assert_eq!(p.id, 4);
            assert_eq!(p.name, "Bob");
        },
        other => panic!("expected PlayerJoin, got {other:?}"),
    }

    let disconnected = codec::encode_server_message_for_test(2, "Player #4 Bob disconnected");
    server.send_to(&disconnected, client_addr).await.expect("send disconnect");
    let (n, _) = server.recv_from(&mut ack_buf).await.expect("recv ack 2");
    assert!(matches!(codec::decode(&ack_buf[..n]), Ok(codec::Frame::ServerMessage { seq: 2, .. })));

    let leave = next_event(&mut events).await;
    match leave {
        Event::PlayerLeave(p, _) => assert_eq!(p.id, 4),
        other => panic!("expected PlayerLeave, got {other:?}"),
    }
}
