use stress_test::{stress_test_lossy, stress_test_reordering, stress_test_scaling, StressResult};
pub mod stress_test;

fn main() -> StressResult<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())
}

async fn async_main() -> StressResult<()> {

    // Run async stress tests
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CAUSAL DELIVERY STRESS TESTS                    ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: small room, heavy reordering
    let stats = stress_test_reordering(4, 100, 3, 1).await?;
    stats.print();

    // Test 2: small room, lossy network
    let stats = stress_test_lossy(4, 100, 0.2, 2).await?;
    stats.print();

    // Test 3: medium room, heavy reordering
    let stats = stress_test_reordering(10, 200, 3, 3).await?;
    stats.print();

    // Test 4: medium room, lossy network
    let stats = stress_test_lossy(10, 200, 0.3, 4).await?;
    stats.print();

    // Test 5: Scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS                                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(20, 4).await?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
