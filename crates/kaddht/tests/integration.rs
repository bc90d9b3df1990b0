// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end scenarios driving real `UdpTransport` sockets on loopback,
//! per spec §8's worked examples: PUT/GET across peers, a multi-hop
//! `FIND_VALUE` chain, TTL expiry, and republication.

use kaddht::{Id, LookupConfig, Node, UdpTransport};
use std::sync::Arc;
use std::time::Duration;

async fn spawn_node(ttl: Duration, refresh: Option<Duration>) -> Arc<Node<UdpTransport>> {
    let transport = Arc::new(UdpTransport::bind("127.0.0.1:0", None).await.unwrap());
    Node::new(transport, Id::random(), ttl, LookupConfig::default(), refresh)
}

#[tokio::test]
async fn put_get_round_trips_across_two_bootstrapped_nodes() {
    let a = spawn_node(Duration::from_secs(60), None).await;
    let b = spawn_node(Duration::from_secs(60), None).await;
    a.bootstrap(&[b.local_addr()]).await;
    b.bootstrap(&[a.local_addr()]).await;

    let key = a.put(b"hello world".to_vec()).await.unwrap();
    assert_eq!(key.to_hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");

    assert_eq!(a.get(key).await.unwrap(), b"hello world");
    assert_eq!(b.get(key).await.unwrap(), b"hello world");
}

#[tokio::test]
async fn iterative_get_finds_value_across_a_two_hop_chain() {
    // A knows only B; B knows only C; C holds the value. A's FIND_VALUE
    // lookup must hop A -> B (contacts) -> C (value).
    let a = spawn_node(Duration::from_secs(60), None).await;
    let b = spawn_node(Duration::from_secs(60), None).await;
    let c = spawn_node(Duration::from_secs(60), None).await;

    a.routing_table()
        .update(kaddht::Contact::new(b.self_id(), b.local_addr()));
    b.routing_table()
        .update(kaddht::Contact::new(c.self_id(), c.local_addr()));

    let key = c.put(b"chained value".to_vec()).await.unwrap();

    // A has never heard of C directly.
    assert!(a
        .routing_table()
        .closest(&c.self_id(), 20)
        .iter()
        .all(|contact| contact.id != c.self_id()));

    let value = a.get(key).await.unwrap();
    assert_eq!(value, b"chained value");

    // C was learned only by referral (inside B's reply), never as a direct
    // responder to A — the lookup driver must still route it in.
    assert!(a
        .routing_table()
        .closest(&c.self_id(), 20)
        .iter()
        .any(|contact| contact.id == c.self_id()));
}

#[tokio::test]
async fn ttl_expiry_removes_an_unread_unrefreshed_value() {
    let node = spawn_node(Duration::from_millis(200), None).await;
    let key = node.put(b"short-lived".to_vec()).await.unwrap();
    assert!(node.store().get(&key).is_some());

    tokio::time::sleep(Duration::from_millis(300)).await;
    // The background GC only sweeps every 60s; force the deadline check the
    // same way the real sweep would once it fires.
    node.store().gc(std::time::Instant::now());

    assert!(node.store().get(&key).is_none());
    assert!(matches!(
        node.get(key).await,
        Err(kaddht::Error::NotFound)
    ));
}

#[tokio::test]
async fn republication_keeps_a_replica_alive_past_its_original_ttl() {
    // A is the origin with a short ttl and an aggressive refresh interval;
    // B holds a replica with the same short ttl. Left idle, B's copy would
    // expire at ~1s; periodic REFRESH from A should keep it alive past that.
    let a = spawn_node(Duration::from_millis(1000), Some(Duration::from_millis(300))).await;
    let b = spawn_node(Duration::from_millis(1000), None).await;
    a.bootstrap(&[b.local_addr()]).await;
    b.bootstrap(&[a.local_addr()]).await;

    let key = a.put(b"republished value".to_vec()).await.unwrap();
    assert!(b.store().get(&key).is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(
        b.store().get(&key).is_some(),
        "replica should have survived past its 1s ttl via origin REFRESH"
    );
}
