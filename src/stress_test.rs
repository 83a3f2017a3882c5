use async_stream::stream;
use causeway_clock::{Message, VectorClock};
use causeway_delivery::{check_causal_order, DeliveryEngine, SimCluster};
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub type StressResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub num_peers: usize,
    pub messages: usize,
    pub total_submits: usize,
    pub total_time: Duration,
    pub avg_submit_time: Duration,
    pub max_pending: usize,
    pub msgs_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Peers:           {:>30} ║", self.num_peers);
        println!("║  Messages Multicast:        {:>30} ║", self.messages);
        println!("║  Total Submissions:         {:>30} ║", self.total_submits);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Submit Time:       {:>28}µs ║", self.avg_submit_time.as_micros());
        println!("║  Deepest Pending Buffer:    {:>30} ║", self.max_pending);
        println!("║  Submissions/Second:        {:>30.0} ║", self.msgs_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

fn average(times: &[Duration]) -> Duration {
    if times.is_empty() {
        Duration::ZERO
    } else {
        times.iter().sum::<Duration>() / times.len() as u32
    }
}

/// Record a conversation among `num_peers` senders in which later messages
/// depend on earlier ones. The cluster has one extra silent slot at the end.
fn record_history(num_peers: usize, msgs_per_peer: usize, seed: u64) -> Vec<Message> {
    let mut cluster = SimCluster::new(num_peers + 1, seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut history = Vec::with_capacity(num_peers * msgs_per_peer);

    for round in 0..msgs_per_peer {
        for peer in 0..num_peers {
            history.push(cluster.send(peer, format!("{}:{}", peer, round)));
            // Let some traffic land so later sends carry dependencies.
            for _ in 0..rng.gen_range(0..num_peers) {
                cluster.deliver_random();
            }
        }
    }
    history
}

/// Generator that yields (observer, history index) arrivals. Every observer
/// sees every message once, in its own random order.
fn arrival_generator(
    num_observers: usize,
    history_len: usize,
    seed: u64,
) -> impl Stream<Item = (usize, usize)> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut orders: Vec<Vec<usize>> = (0..num_observers)
            .map(|_| {
                let mut order: Vec<usize> = (0..history_len).collect();
                order.shuffle(&mut rng);
                order
            })
            .collect();

        while orders.iter().any(|order| !order.is_empty()) {
            let observer = rng.gen_range(0..num_observers);
            if let Some(index) = orders[observer].pop() {
                yield (observer, index);
            }
        }
    }
}

/// Replay a recorded history to several observers in random arrival order
pub async fn stress_test_reordering(
    num_peers: usize,
    msgs_per_peer: usize,
    num_observers: usize,
    seed: u64,
) -> StressResult<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Reordered Delivery Stress Test (Async)              ║");
    println!("║  Peers: {} | Msgs/Peer: {} | Observers: {} ║",
             num_peers, msgs_per_peer, num_observers);
    println!("╚════════════════════════════════════════════════════════════╝");

    println!("\n[Phase 1/2] Recording causal history...");
    let history = Arc::new(record_history(num_peers, msgs_per_peer, seed));
    println!("[Phase 1/2] ✓ Recorded {} messages", history.len());

    let start = Instant::now();
    let mut observers: Vec<Arc<Mutex<DeliveryEngine>>> = Vec::with_capacity(num_observers);
    for _ in 0..num_observers {
        let clock = VectorClock::new(num_peers + 1, num_peers)?;
        observers.push(Arc::new(Mutex::new(DeliveryEngine::new(clock))));
    }

    println!("[Phase 2/2] Submitting in random order...");
    let mut submit_times = Vec::with_capacity(history.len() * num_observers);
    let mut max_pending = 0;
    let mut arrivals = Box::pin(arrival_generator(num_observers, history.len(), seed));

    while let Some((observer, index)) = arrivals.next().await {
        let mut engine = observers[observer].lock().await;
        let submit_start = Instant::now();
        engine.submit(history[index].clone())?;
        submit_times.push(submit_start.elapsed());
        max_pending = max_pending.max(engine.pending_count());
        drop(engine);

        if submit_times.len() % 1000 == 0 {
            tokio::task::yield_now().await;
        }
    }

    for observer in &observers {
        let engine = observer.lock().await;
        if engine.pending_count() != 0 {
            return Err(format!("{} messages never delivered", engine.pending_count()).into());
        }
        check_causal_order(engine.delivered().as_slice())?;
    }

    let total_time = start.elapsed();
    println!("[Phase 2/2] ✓ Every observer delivered the full history causally");

    Ok(StressTestStats {
        num_peers,
        messages: history.len(),
        total_submits: submit_times.len(),
        total_time,
        avg_submit_time: average(&submit_times),
        max_pending,
        msgs_per_second: submit_times.len() as f64 / total_time.as_secs_f64(),
    })
}

/// Lossy network: copies are dropped, then retransmitted until every peer
/// has caught up
pub async fn stress_test_lossy(
    num_peers: usize,
    rounds: usize,
    loss_rate: f64,
    seed: u64,
) -> StressResult<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Lossy Network Stress Test                           ║");
    println!("║  Peers: {} | Rounds: {} | Loss: {:.0}% ║",
             num_peers, rounds, loss_rate * 100.0);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let mut cluster = SimCluster::with_loss(num_peers, seed, loss_rate);
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    let mut submit_time = Duration::ZERO;

    println!("\n[Phase 1/2] Chatting over a lossy network...");
    for round in 0..rounds {
        for peer in 0..num_peers {
            cluster.send(peer, format!("{}:{}", peer, round));
            let submit_start = Instant::now();
            for _ in 0..rng.gen_range(0..num_peers * 2) {
                cluster.deliver_random();
            }
            submit_time += submit_start.elapsed();
        }
        if round % 50 == 0 {
            tokio::task::yield_now().await;
        }
    }
    let submit_start = Instant::now();
    cluster.drain();
    submit_time += submit_start.elapsed();
    println!("[Phase 1/2] ✓ {} copies lost, {} held", cluster.network().lost_count(), cluster.total_pending());

    println!("[Phase 2/2] Retransmitting...");
    let mut retransmits = 0;
    while !cluster.is_quiescent() {
        let submit_start = Instant::now();
        cluster.retransmit_and_drain();
        submit_time += submit_start.elapsed();
        retransmits += 1;
        tokio::task::yield_now().await;
    }
    if !cluster.is_converged() {
        return Err("peers did not converge".into());
    }
    cluster.check_causal_order()?;
    println!("[Phase 2/2] ✓ Converged after {} retransmit rounds", retransmits);

    let total_time = start.elapsed();
    let messages = num_peers * rounds;
    let total_submits = cluster.total_submitted();

    Ok(StressTestStats {
        num_peers,
        messages,
        total_submits,
        total_time,
        avg_submit_time: submit_time / total_submits.max(1) as u32,
        max_pending: cluster.max_pending(),
        msgs_per_second: total_submits as f64 / total_time.as_secs_f64(),
    })
}

/// Compare buffer depth and throughput across cluster sizes
pub async fn stress_test_scaling(max_peers: usize, step_size: usize) -> StressResult<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Delivery vs Peer Count             ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut current_peers = step_size;
    while current_peers <= max_peers {
        let stats = stress_test_reordering(current_peers, 50, 2, current_peers as u64).await?;
        stats.print();
        current_peers += step_size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_small_reordering_run() {
        let stats = stress_test_reordering(3, 10, 2, 1).await.unwrap();
        assert_eq!(stats.messages, 30);
        assert_eq!(stats.total_submits, 60);
    }

    #[tokio::test]
    async fn test_small_lossy_run() {
        let stats = stress_test_lossy(3, 10, 0.2, 9).await.unwrap();
        assert_eq!(stats.messages, 30);
        // Every copy reaches its peer exactly once, lost ones on retransmit.
        assert_eq!(stats.total_submits, 60);
        assert!(stats.avg_submit_time <= stats.total_time);
    }

    #[tokio::test]
    async fn test_generator_covers_every_arrival_once() {
        let mut seen: Vec<(usize, usize)> = arrival_generator(2, 5, 3).collect().await;
        seen.sort();
        let expected: Vec<_> = (0..2).flat_map(|o| (0..5).map(move |i| (o, i))).collect();
        assert_eq!(seen, expected);
    }
}
