use stress_test::{stress_test_editing, stress_test_scaling, StressConfig};
use tracing_subscriber::EnvFilter;
pub mod stress_test;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())?;
    Ok(())
}

async fn async_main() -> flowsync_sync::Result<()> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CONCURRENT EDITING STRESS TESTS                 ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: a few clients, short sessions
    let stats = stress_test_editing(StressConfig::default()).await?;
    stats.print();

    // Test 2: more clients, longer sessions
    let stats = stress_test_editing(StressConfig {
        num_clients: 10,
        edits_per_client: 300,
        seed: 0xf10e,
    })
    .await?;
    stats.print();

    // Test 3: scaling analysis
    stress_test_scaling(16, 4).await?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
