//! End-to-end tests for chat nodes over memory and TCP transports.

use causeway_delivery::check_causal_order;
use causeway_net::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

fn loopback(port: u16) -> PeerAddr {
    PeerAddr::new([127, 0, 0, 1].into(), port)
}

async fn next_event(events: &mut UnboundedReceiver<Message>) -> Message {
    assert_ok!(timeout(Duration::from_secs(5), events.recv()).await)
        .expect("event stream closed")
}

fn memory_room(n: u16) -> Vec<(ChatNode<MemoryTransport>, UnboundedReceiver<Message>)> {
    let members: Vec<_> = (1..=n).map(|p| loopback(7000 + p)).collect();
    create_network(&members)
        .into_iter()
        .zip(members.iter())
        .map(|(transport, me)| {
            let membership = Membership::from_members(members.clone(), *me).unwrap();
            let inbox = transport.subscribe().unwrap();
            let node = ChatNode::new(membership, Arc::new(transport), NodeConfig::default());
            node.spawn_receiver(inbox);
            let events = node.events().unwrap();
            (node, events)
        })
        .collect()
}

#[tokio::test]
async fn test_three_node_conversation_is_causal_everywhere() {
    let mut room = memory_room(3);

    room[0].0.send("anyone up?").await.wait().await;
    let question = next_event(&mut room[1].1).await;
    assert_eq!(question.payload(), "anyone up?");

    room[1].0.send("yes").await.wait().await;
    room[2].0.send("me too").await.wait().await;

    // Node 2 must see the question before the answer it caused.
    let first = next_event(&mut room[2].1).await;
    let second = next_event(&mut room[2].1).await;
    assert_eq!(first.payload(), "anyone up?");
    assert_eq!(second.payload(), "yes");

    let mut seen_by_0 = vec![next_event(&mut room[0].1).await, next_event(&mut room[0].1).await];
    seen_by_0.sort_by(|a, b| a.payload().cmp(b.payload()));
    assert_eq!(seen_by_0[0].payload(), "me too");
    assert_eq!(seen_by_0[1].payload(), "yes");

    for (node, _) in &room {
        assert_eq!(node.engine().pending_count(), 0);
        assert!(check_causal_order(&node.engine().delivered()).is_ok());
    }
}

#[tokio::test]
async fn test_unreachable_peer_is_reported_and_others_still_receive() {
    let mut room = memory_room(3);
    let dead = room[1].0.membership().self_addr();
    room[0].0.transport().disconnect(&dead);

    let outcomes = room[0].0.send("partial").await.wait().await;
    assert_eq!(outcomes.len(), 2);
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_ok()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].peer, dead);
    assert_err!(&failed[0].result);

    assert_eq!(next_event(&mut room[2].1).await.payload(), "partial");
    assert_eq!(room[1].0.engine().delivered_count(), 0);
}

#[tokio::test]
async fn test_tcp_room() {
    let mut servers = Vec::new();
    for _ in 0..3 {
        servers.push(assert_ok!(TcpServer::bind("127.0.0.1:0").await));
    }
    let members: Vec<PeerAddr> = servers
        .iter()
        .map(|s| PeerAddr::from(s.local_addr().unwrap()))
        .collect();

    let mut room = Vec::new();
    for (server, me) in servers.into_iter().zip(members.iter()) {
        let membership = Membership::from_members(members.clone(), *me).unwrap();
        let config = NodeConfigBuilder::new()
            .connect_timeout(Duration::from_secs(2))
            .build();
        let transport = Arc::new(TcpTransport::new(config.connect_timeout));
        let node = ChatNode::new(membership, transport, config);
        server.spawn(node.engine().clone());
        let events = node.events().unwrap();
        room.push((node, events));
    }

    for i in 0..5 {
        let failures = room[0].0.send(format!("line {}", i)).await.failures().await;
        assert!(failures.is_empty(), "{:?}", failures);
    }
    for (_, events) in room.iter_mut().skip(1) {
        for i in 0..5 {
            assert_eq!(next_event(events).await.payload(), format!("line {}", i));
        }
    }

    let reply = room[2].0.send("got them").await.wait().await;
    assert!(reply.iter().all(|o| o.is_ok()));
    assert_eq!(next_event(&mut room[0].1).await.payload(), "got them");
    assert_eq!(room[0].0.clock().values(), &[5, 0, 1]);
}

#[tokio::test]
async fn test_tcp_send_to_missing_peer_fails_fast() {
    let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let me = PeerAddr::from(server.local_addr().unwrap());

    // A port nobody listens on.
    let ghost_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ghost = PeerAddr::from(ghost_listener.local_addr().unwrap());
    drop(ghost_listener);

    let membership = Membership::from_members(vec![me, ghost], me).unwrap();
    let node = ChatNode::new(
        membership,
        Arc::new(TcpTransport::new(Duration::from_secs(1))),
        NodeConfig::default(),
    );
    server.spawn(node.engine().clone());

    let outcomes = node.send("into the void").await.wait().await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].result,
        Err(NetError::ConnectionFailed { .. })
    ));
    // Sending still advanced our own slot.
    assert_eq!(node.clock().values(), &[1, 0]);
}

#[tokio::test]
async fn test_silent_peer_does_not_stall_the_room() {
    let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let me = PeerAddr::from(server.local_addr().unwrap());

    // Accepts connections but never replies.
    let silent_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent = PeerAddr::from(silent_listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = silent_listener.accept().await {
            held.push(stream);
        }
    });

    let live_server = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let live = PeerAddr::from(live_server.local_addr().unwrap());

    let members = vec![me, silent, live];
    let config = NodeConfigBuilder::new()
        .connect_timeout(Duration::from_secs(1))
        .request_timeout(Duration::from_millis(100))
        .outbound_queue(4)
        .build();

    let node = ChatNode::new(
        Membership::from_members(members.clone(), me).unwrap(),
        Arc::new(TcpTransport::from_config(&config)),
        config.clone(),
    );
    server.spawn(node.engine().clone());

    let listener = ChatNode::new(
        Membership::from_members(members.clone(), live).unwrap(),
        Arc::new(TcpTransport::from_config(&config)),
        config,
    );
    live_server.spawn(listener.engine().clone());
    let mut events = listener.events().unwrap();

    // Far more messages than the silent peer's queue can hold.
    let mut reports = Vec::new();
    for i in 0..40 {
        let report = assert_ok!(timeout(Duration::from_secs(1), node.send(format!("{}", i))).await);
        assert_eq!(next_event(&mut events).await.payload(), format!("{}", i));
        reports.push(report);
    }

    for report in reports {
        let outcomes = assert_ok!(timeout(Duration::from_secs(10), report.wait()).await);
        let by_peer = |peer: PeerAddr| outcomes.iter().find(|o| o.peer == peer).unwrap();
        assert_err!(&by_peer(silent).result);
        assert_ok!(&by_peer(live).result);
    }
    assert_eq!(node.clock().values(), &[40, 0, 0]);
}
