//! Pipeline Collaboration Example
//!
//! Two editors open the starter pipeline. One deletes the sort node while the
//! other is still tweaking it; both end up with the same document.
//!
//! Run with: cargo run --example pipeline_collab

use flowsync_doc::{NodeBody, NodeId, Operation, Position};
use flowsync_sync::{spawn_host, ClientConfigBuilder, HostConfig, SyncClient, SyncEvent};

#[tokio::main]
async fn main() {
    println!("=== Pipeline Collaboration Example ===\n");

    let host = spawn_host(HostConfig::default());
    let config = ClientConfigBuilder::new().path("starter").build();
    let alice = SyncClient::start(config.clone(), host.connect().expect("connect alice"));
    let bob = SyncClient::start(config, host.connect().expect("connect bob"));

    let loaded = alice.wait_settled(0).await.expect("alice loads");
    bob.wait_settled(0).await.expect("bob loads");
    let doc = loaded.doc.expect("document");
    println!("Starter pipeline has {} nodes:", doc.len());
    for id in &doc.index {
        if let Some(node) = doc.node(id) {
            println!("  - {} ({})", id, node.kind().as_str());
        }
    }
    println!();

    let mut bob_events = bob.subscribe();
    let sort = NodeId::from("demo_3");

    // Alice removes the sort node
    let ops = doc.remove_node_ops(&sort).expect("sort node exists");
    println!("Alice removes {} with {} operations", sort, ops.len());
    let alice_edit = alice.edit(ops);

    // Bob, unaware, moves it and renames its column
    println!("Bob moves {} and renames its sort column", sort);
    let bob_edit = bob.edit(vec![
        Operation::SetPosition {
            id: sort.clone(),
            position: Position::new(640.0, 80.0),
        },
        Operation::SetSortColumn {
            id: sort.clone(),
            index: 0,
            column: "revenue".into(),
        },
    ]);
    let (a, b) = tokio::join!(alice_edit, bob_edit);
    println!("  alice: {:?}, bob: {:?}\n", a, b);

    alice.wait_settled(0).await.expect("alice settles");
    bob.wait_settled(0).await.expect("bob settles");
    let (version, server_doc) = host
        .snapshot("starter")
        .await
        .expect("host running")
        .expect("document open");

    println!("=== Bob's events ===\n");
    while let Ok(event) = bob_events.try_recv() {
        match event {
            SyncEvent::RemoteBatch { version, count } => {
                println!("  merged remote batch v{} ({} ops)", version, count)
            }
            other => println!("  {:?}", other),
        }
    }
    println!();

    let alice_doc = alice.wait_settled(version).await.expect("alice").doc;
    let bob_doc = bob.wait_settled(version).await.expect("bob").doc;
    println!("Server version: {}", version);
    println!("Nodes on server: {}", server_doc.len());
    println!("Sort node present: {}", server_doc.contains(&sort));
    println!("Alice converged: {}", alice_doc.as_ref() == Some(&server_doc));
    println!("Bob converged: {}", bob_doc.as_ref() == Some(&server_doc));

    if let Some(node) = server_doc.node(&NodeId::from("demo_2")) {
        if let NodeBody::Aggregate(aggregate) = &node.body {
            println!("Aggregate now feeds {} nodes ({} aggregates)", node.outputs.len(), aggregate.aggregates.len());
        }
    }

    alice.close().await;
    bob.close().await;
    host.shutdown().await;
    println!("\n=== Example Complete ===");
}
