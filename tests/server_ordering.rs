//! End-to-end through `GatewayServer` on the channel transport: per-node
//! ordering, cross-node parallelism and draining on shutdown.
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{standard_registry, test_config};
use meshgate::gateway::GatewayServer;
use meshgate::plugin::GpsLocation;
use meshgate::transport::{ChannelTransport, InboundMessage};

fn replies_for(sent: &[(String, String)], node: &str) -> Vec<String> {
    sent.iter()
        .filter(|(n, _)| n == node)
        .map(|(_, chunk)| chunk.clone())
        .collect()
}

#[tokio::test]
async fn messages_for_one_node_are_answered_in_order() {
    let (source, sink, mut handle) = ChannelTransport::pair();
    let server = GatewayServer::new(&test_config(), standard_registry(), Arc::new(sink)).unwrap();
    let task = tokio::spawn(async move { server.run_until(source, std::future::pending()).await });

    handle.say("!a", "1").unwrap();
    for i in 0..20 {
        handle.say("!a", &format!("m{}", i)).unwrap();
    }
    handle.close();
    task.await.unwrap().unwrap();

    let sent = handle.drain();
    let replies = replies_for(&sent, "!a");
    assert_eq!(replies.len(), 21);
    assert_eq!(replies[0], "Echo ready");
    for (i, reply) in replies[1..].iter().enumerate() {
        assert_eq!(reply, &format!("echo: m{}", i));
    }
}

#[tokio::test]
async fn interleaved_nodes_each_keep_their_order() {
    let (source, sink, mut handle) = ChannelTransport::pair();
    let server = GatewayServer::new(&test_config(), standard_registry(), Arc::new(sink)).unwrap();
    let task = tokio::spawn(async move { server.run_until(source, std::future::pending()).await });

    for node in ["!a", "!b", "!c"] {
        handle.say(node, "1").unwrap();
    }
    for i in 0..10 {
        for node in ["!a", "!b", "!c"] {
            handle.say(node, &format!("{}-{}", node, i)).unwrap();
        }
    }
    handle.close();
    task.await.unwrap().unwrap();

    let sent = handle.drain();
    for node in ["!a", "!b", "!c"] {
        let expected: Vec<String> = std::iter::once("Echo ready".to_string())
            .chain((0..10).map(|i| format!("echo: {}-{}", node, i)))
            .collect();
        assert_eq!(replies_for(&sent, node), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn slow_plugin_for_one_node_does_not_block_others() {
    let mut config = test_config();
    config.server.plugin_timeout_seconds = 30;
    let (source, sink, mut handle) = ChannelTransport::pair();
    let server = GatewayServer::new(&config, standard_registry(), Arc::new(sink)).unwrap();
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(async move { server.run_until(source, std::future::pending()).await });

    // Slow (3) sleeps one second per message.
    for node in ["!a", "!b", "!c", "!d"] {
        handle.say(node, "3").unwrap();
        handle.say(node, "work").unwrap();
    }
    handle.close();
    task.await.unwrap().unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2), "lanes ran serially: {:?}", elapsed);

    let sent = handle.drain();
    for node in ["!a", "!b", "!c", "!d"] {
        assert_eq!(
            replies_for(&sent, node),
            vec!["Slow ready".to_string(), format!("work done for {}", node)]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn same_node_messages_never_overlap() {
    let mut config = test_config();
    config.server.plugin_timeout_seconds = 30;
    let (source, sink, mut handle) = ChannelTransport::pair();
    let server = GatewayServer::new(&config, standard_registry(), Arc::new(sink)).unwrap();
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(async move { server.run_until(source, std::future::pending()).await });

    handle.say("!a", "3").unwrap();
    handle.say("!a", "first").unwrap();
    handle.say("!a", "second").unwrap();
    handle.close();
    task.await.unwrap().unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(
        replies_for(&handle.drain(), "!a"),
        vec![
            "Slow ready".to_string(),
            "first done for !a".to_string(),
            "second done for !a".to_string()
        ]
    );
}

#[tokio::test]
async fn location_reaches_the_plugin() {
    let mut config = test_config();
    config.server.plugin_timeout_seconds = 30;
    config.server.max_message_size = 200;
    let (source, sink, mut handle) = ChannelTransport::pair();
    let registry = meshgate::gateway::PluginRegistry::new()
        .with(Arc::new(common::SlowPlugin::new(1, Duration::ZERO)))
        .unwrap();
    let server = GatewayServer::new(&config, registry, Arc::new(sink)).unwrap();
    let task = tokio::spawn(async move { server.run_until(source, std::future::pending()).await });

    handle.say("!gps", "1").unwrap();
    let location = GpsLocation::new(59.91, 10.76, None).unwrap();
    handle
        .inject(InboundMessage::new("!gps", "where").with_location(location))
        .unwrap();
    handle.close();
    task.await.unwrap().unwrap();

    assert_eq!(
        replies_for(&handle.drain(), "!gps"),
        vec!["Slow ready".to_string(), "where done for !gps @59.9,10.8".to_string()]
    );
}

#[tokio::test]
async fn long_reply_arrives_as_ordered_chunks() {
    let mut config = test_config();
    config.server.max_message_size = 24;
    let (source, sink, mut handle) = ChannelTransport::pair();
    let server = GatewayServer::new(&config, standard_registry(), Arc::new(sink)).unwrap();
    let task = tokio::spawn(async move { server.run_until(source, std::future::pending()).await });

    let text = "the quick brown fox jumps over the lazy dog again and again";
    handle.say("!a", "1").unwrap();
    handle.say("!a", text).unwrap();
    handle.close();
    task.await.unwrap().unwrap();

    let sent = handle.drain();
    let replies = replies_for(&sent, "!a");
    // Welcome first, then the chunked echo.
    assert_eq!(replies[0], "Echo ready");
    let chunks = &replies[1..];
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.len() <= 24));
    assert!(chunks[..chunks.len() - 1].iter().all(|c| c.ends_with(meshgate::gateway::MARKER)));
    assert_eq!(meshgate::gateway::strip_markers(chunks), format!("echo: {}", text));
}

#[tokio::test]
async fn shutdown_signal_stops_the_server() {
    let (source, sink, handle) = ChannelTransport::pair();
    let server = GatewayServer::new(&test_config(), standard_registry(), Arc::new(sink)).unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        server
            .run_until(source, async {
                let _ = stop_rx.await;
            })
            .await
    });

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("server stopped")
        .unwrap()
        .unwrap();
    drop(handle);
}
