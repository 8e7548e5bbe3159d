use async_stream::stream;
use flowsync_doc::{
    Document, Node, NodeBody, NodeId, NodeKind, Operation, Position, SelectColumn,
};
use flowsync_sync::{
    spawn_host, ClientConfigBuilder, HostConfig, Result, SyncClient, SyncError, SyncEvent,
};
use futures::stream::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::warn;

const PATH: &str = "stress";

/// Parameters of one stress run
#[derive(Clone, Debug)]
pub struct StressConfig {
    pub num_clients: usize,
    pub edits_per_client: usize,
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            num_clients: 4,
            edits_per_client: 100,
            seed: 0x5eed,
        }
    }
}

/// Statistics collected during stress testing
#[derive(Clone, Debug, Default)]
pub struct StressTestStats {
    pub num_clients: usize,
    pub edits_per_client: usize,
    pub edits_applied: usize,
    pub edits_refused: usize,
    pub remote_batches: usize,
    pub resyncs: usize,
    pub final_version: u64,
    pub final_nodes: usize,
    pub converged: bool,
    pub total_time: Duration,
    pub edits_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                        ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Clients:         {:>30} ║", self.num_clients);
        println!("║  Edits per Client:          {:>30} ║", self.edits_per_client);
        println!("║  Edits Applied:             {:>30} ║", self.edits_applied);
        println!("║  Edits Refused:             {:>30} ║", self.edits_refused);
        println!("║  Remote Batches Merged:     {:>30} ║", self.remote_batches);
        println!("║  Resyncs:                   {:>30} ║", self.resyncs);
        println!("║  Final Version:             {:>30} ║", self.final_version);
        println!("║  Final Nodes:               {:>30} ║", self.final_nodes);
        println!("║  Converged:                 {:>30} ║", self.converged);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Edits/Second:              {:>30.0} ║", self.edits_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// One randomly chosen edit; the numbers pick targets and values
#[derive(Clone, Copy, Debug)]
struct EditChoice {
    kind: u8,
    a: usize,
    b: usize,
}

/// Generator that yields the edit choices of one client
fn edit_generator(seed: u64, count: usize) -> impl Stream<Item = EditChoice> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..count {
            yield EditChoice {
                kind: rng.gen_range(0..8),
                a: rng.gen(),
                b: rng.gen(),
            };
        }
    }
}

/// Turn a choice into operations against the client's current document
fn build_ops(doc: &Document, choice: EditChoice, label: &str) -> Vec<Operation> {
    if doc.is_empty() || choice.kind == 0 {
        let kind = NodeKind::ALL[choice.a % NodeKind::ALL.len()];
        let position = Position::new((choice.b % 1000) as f64, (choice.a % 1000) as f64);
        return doc.add_node_ops(Node::template(kind, NodeId::from(label), position));
    }

    let pick = |n: usize| doc.index[n % doc.index.len()].clone();
    let id = pick(choice.a);
    let Some(node) = doc.node(&id) else {
        return Vec::new();
    };

    match choice.kind {
        1 | 2 => vec![Operation::SetPosition {
            id,
            position: Position::new((choice.b % 800) as f64, (choice.a % 600) as f64),
        }],
        3 => {
            let slots = node.slots();
            if slots.is_empty() {
                return Vec::new();
            }
            let (name, _) = slots[choice.b % slots.len()];
            let input = (choice.b % 4 != 0).then(|| pick(choice.b));
            vec![Operation::SetInput { id, name, input }]
        }
        4 => doc.raise_ops(&id).unwrap_or_default(),
        5 => match &node.body {
            NodeBody::Select(select) => vec![Operation::InsertSelect {
                index: choice.b % (select.columns.len() + 1),
                id,
                column: SelectColumn {
                    column: label.to_string(),
                    alias: String::new(),
                },
            }],
            NodeBody::LoadCsv(_) => vec![Operation::SetLoadCsvFilename {
                id,
                filename: format!("{label}.csv"),
            }],
            _ => Vec::new(),
        },
        6 => match &node.body {
            NodeBody::Select(select) if !select.columns.is_empty() => {
                vec![Operation::SetSelectAlias {
                    index: choice.b % select.columns.len(),
                    id,
                    alias: label.to_string(),
                }]
            }
            _ => Vec::new(),
        },
        _ => {
            // keep the graph populated: only remove leaf nodes
            if node.outputs.is_empty() && choice.b % 3 == 0 {
                doc.remove_node_ops(&id).unwrap_or_default()
            } else {
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Default)]
struct ClientTally {
    applied: usize,
    refused: usize,
}

/// Drive one client through its edit schedule
async fn drive_client(
    client: SyncClient,
    index: usize,
    seed: u64,
    count: usize,
) -> Result<(SyncClient, ClientTally)> {
    let mut tally = ClientTally::default();
    let mut edits = Box::pin(edit_generator(seed, count));
    let mut serial = 0;

    while let Some(choice) = edits.next().await {
        serial += 1;
        let Some(doc) = client.snapshot().doc else {
            tally.refused += 1;
            continue;
        };
        let ops = build_ops(&doc, choice, &format!("c{index}-{serial}"));
        if ops.is_empty() {
            continue;
        }
        match client.edit(ops).await {
            Ok(()) => tally.applied += 1,
            // the snapshot went stale or a resync is in flight
            Err(SyncError::NotReady) | Err(SyncError::Doc(_)) => tally.refused += 1,
            Err(err) => return Err(err),
        }

        if serial % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }

    Ok((client, tally))
}

/// Run concurrent editors against one server and check they converge
pub async fn stress_test_editing(config: StressConfig) -> Result<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Concurrent Editing Stress Test                      ║");
    println!(
        "║  Clients: {} | Edits/Client: {} | Seed: {:#x} ║",
        config.num_clients, config.edits_per_client, config.seed
    );
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let host = spawn_host(HostConfig::default());

    println!("\n[Phase 1/3] Connecting clients...");
    let client_config = ClientConfigBuilder::new()
        .path(PATH)
        .event_capacity(config.edits_per_client * 8 + 64)
        .build();
    let mut clients = Vec::with_capacity(config.num_clients);
    let mut events = Vec::with_capacity(config.num_clients);
    for _ in 0..config.num_clients {
        let client = SyncClient::start(client_config.clone(), host.connect()?);
        client.wait_settled(0).await?;
        events.push(client.subscribe());
        clients.push(client);
    }
    println!("[Phase 1/3] ✓ Completed");

    println!("[Phase 2/3] Editing concurrently...");
    let mut handles = Vec::with_capacity(clients.len());
    for (index, client) in clients.into_iter().enumerate() {
        let seed = config.seed.wrapping_add(index as u64);
        handles.push(tokio::spawn(drive_client(
            client,
            index,
            seed,
            config.edits_per_client,
        )));
    }

    let mut stats = StressTestStats {
        num_clients: config.num_clients,
        edits_per_client: config.edits_per_client,
        ..Default::default()
    };
    let mut clients = Vec::with_capacity(handles.len());
    for handle in handles {
        let (client, tally) = handle.await.map_err(|_| SyncError::ChannelClosed)??;
        stats.edits_applied += tally.applied;
        stats.edits_refused += tally.refused;
        clients.push(client);
    }
    println!("[Phase 2/3] ✓ Completed");

    println!("[Phase 3/3] Waiting for convergence...");
    for client in &clients {
        client.wait_settled(0).await?;
    }
    let (version, doc) = host
        .snapshot(PATH)
        .await?
        .ok_or_else(|| SyncError::Protocol(format!("{PATH} is not open")))?;
    stats.final_version = version;
    stats.final_nodes = doc.len();
    stats.converged = doc.validate().is_ok();
    for (index, client) in clients.iter().enumerate() {
        let settled = client.wait_settled(version).await?;
        if settled.doc.as_ref() != Some(&doc) {
            warn!(index, "client diverged from the server");
            stats.converged = false;
        }
    }

    for receiver in &mut events {
        loop {
            match receiver.try_recv() {
                Ok(SyncEvent::RemoteBatch { .. }) => stats.remote_batches += 1,
                Ok(SyncEvent::Resyncing) => stats.resyncs += 1,
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
    }

    for client in clients {
        client.close().await;
    }
    host.shutdown().await;

    stats.total_time = start.elapsed();
    stats.edits_per_second = stats.edits_applied as f64 / stats.total_time.as_secs_f64();
    println!("[Phase 3/3] ✓ Completed");

    Ok(stats)
}

/// Stress runs with a growing number of clients
pub async fn stress_test_scaling(max_clients: usize, step_size: usize) -> Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Convergence vs Clients            ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut current = step_size;
    while current <= max_clients {
        let stats = stress_test_editing(StressConfig {
            num_clients: current,
            edits_per_client: 50,
            seed: current as u64,
        })
        .await?;
        stats.print();
        current += step_size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choices_build_valid_edits() {
        let mut doc = Document::demo().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for serial in 0..200 {
            let choice = EditChoice {
                kind: rng.gen_range(0..8),
                a: rng.gen(),
                b: rng.gen(),
            };
            let ops = build_ops(&doc, choice, &format!("t-{serial}"));
            doc = doc.apply_batch(&ops).unwrap().doc;
        }
        doc.validate().unwrap();
        assert!(!doc.is_empty());
    }

    #[tokio::test]
    async fn test_small_run_converges() {
        let stats = stress_test_editing(StressConfig {
            num_clients: 3,
            edits_per_client: 40,
            seed: 11,
        })
        .await
        .unwrap();
        assert!(stats.converged);
        assert!(stats.edits_applied > 0);
        assert_eq!(stats.num_clients, 3);
    }
}
