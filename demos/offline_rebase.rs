//! Offline Rebase Example
//!
//! Drives two replicas and a broker by hand, without any runtime, to show
//! how queued edits are rebased over a batch that the server ordered first.
//!
//! Run with: cargo run --example offline_rebase

use flowsync_doc::{Document, Node, NodeBody, NodeId, NodeKind, Operation, Position, SelectColumn};
use flowsync_sync::{Broker, ClientId, ClientMessage, Envelope, HostConfigBuilder, Replica};

fn deliver(replica: &mut Replica, replies: Vec<Envelope>) -> Vec<ClientMessage> {
    let mut outgoing = Vec::new();
    for envelope in replies {
        outgoing.extend(replica.receive(envelope.message).expect("receive"));
    }
    outgoing
}

fn columns(doc: &Document, id: &NodeId) -> Vec<String> {
    match doc.node(id).map(|node| &node.body) {
        Some(NodeBody::Select(select)) => select
            .columns
            .iter()
            .map(|c| match c.alias.as_str() {
                "" => c.column.clone(),
                alias => format!("{} as {}", c.column, alias),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn main() {
    println!("=== Offline Rebase Example ===\n");

    let mut broker = Broker::new(HostConfigBuilder::new().seed_demo(false).build());
    let (a, b) = (ClientId::new(), ClientId::new());
    let mut alice = Replica::default();
    let mut bob = Replica::default();
    deliver(&mut alice, vec![broker.connect(a.clone())]);
    deliver(&mut bob, vec![broker.connect(b.clone())]);

    let open = alice.open("scratch");
    deliver(&mut alice, broker.handle(&a, open));
    let open = bob.open("scratch");
    deliver(&mut bob, broker.handle(&b, open));

    // Alice builds a select node with three columns
    let select = NodeId::from("select");
    let doc = alice.document().expect("loaded").clone();
    let mut ops = doc.add_node_ops(Node::template(NodeKind::Select, select.clone(), Position::default()));
    for (index, column) in ["region", "product", "revenue"].into_iter().enumerate() {
        ops.push(Operation::SetSelectColumn {
            id: select.clone(),
            index,
            column: column.into(),
        });
        if index < 2 {
            ops.push(Operation::InsertSelect {
                id: select.clone(),
                index: index + 1,
                column: SelectColumn {
                    column: String::new(),
                    alias: String::new(),
                },
            });
        }
    }
    let update = alice.edit(&ops).expect("edit").expect("sent");
    let replies = broker.handle(&a, update);
    for envelope in replies {
        if envelope.to == a {
            alice.receive(envelope.message).expect("ack");
        } else {
            bob.receive(envelope.message).expect("remote");
        }
    }
    println!("Both replicas see columns {:?}\n", columns(bob.document().expect("doc"), &select));

    // Alice drops the second column and her batch reaches the server first
    let drop = alice
        .edit(&[Operation::DeleteSelect { id: select.clone(), index: 1 }])
        .expect("edit")
        .expect("sent");
    println!("Alice deletes column 1");

    // Meanwhile Bob renames the third column
    let rename = bob
        .edit(&[Operation::SetSelectAlias {
            id: select.clone(),
            index: 2,
            alias: "total".into(),
        }])
        .expect("edit")
        .expect("sent");
    println!("Bob aliases column 2 as \"total\" (in flight: {} ops)", bob.sent().len());

    let mut to_alice = Vec::new();
    let mut to_bob = Vec::new();
    for message in [(a.clone(), drop), (b.clone(), rename)] {
        for envelope in broker.handle(&message.0, message.1) {
            if envelope.to == a {
                to_alice.push(envelope);
            } else {
                to_bob.push(envelope);
            }
        }
    }

    // Bob receives Alice's batch first, then the ack for his rebased edit
    deliver(&mut bob, to_bob);
    deliver(&mut alice, to_alice);

    println!("\nAfter reconciliation:");
    println!("  alice: {:?} (v{})", columns(alice.document().expect("doc"), &select), alice.version());
    println!("  bob:   {:?} (v{})", columns(bob.document().expect("doc"), &select), bob.version());
    println!("  server: v{}", broker.host("scratch").map(|host| host.version()).unwrap_or_default());
    println!("  converged: {}", alice.document() == bob.document());

    println!("\n=== Example Complete ===");
}
