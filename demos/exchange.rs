//! Exchange demo - an irregular halo exchange on a ring of ranks.
//!
//! This example demonstrates:
//! - Running a group of ranks in process with `LocalGroup`
//! - Negotiated exchange when receive sizes are unknown
//! - Callback exchange with best-effort completion
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=commwire=debug cargo run --example exchange -- 6
//! ```

use commwire::exchange::{Completion, Exchanger};
use commwire::transport::{LocalGroup, Transport};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let size: usize = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(4);

    let reports = LocalGroup::run(size, |t| async move {
        let me = t.rank();
        let n = t.size();
        let exchanger = Exchanger::new(&t);

        // Each rank ships a rank-dependent number of (cell, value) pairs to
        // its right neighbour; nobody knows in advance what arrives.
        let mut send_lists = vec![Vec::new(); n];
        send_lists[(me + 1) % n] = (0..me + 1)
            .map(|i| ((me * 100 + i) as u32, i as f64 * 0.5))
            .collect::<Vec<(u32, f64)>>();
        let ghosts = exchanger.negotiated(&send_lists).await?;
        let received: usize = ghosts.iter().map(Vec::len).sum();

        // Then every rank trades one checksum with both neighbours.
        let mut partners = vec![(me + 1) % n, (me + n - 1) % n];
        partners.dedup();
        partners.retain(|&p| p != me);
        let mut sums = Vec::new();
        exchanger
            .with_callbacks(
                &partners,
                |_, out: &mut Vec<u64>| {
                    out.push(received as u64);
                    Ok(())
                },
                |p, items| {
                    sums.push((p, items.first().copied().unwrap_or_default()));
                    Ok(())
                },
                Completion::BestEffort,
            )
            .await?;

        Ok(format!(
            "rank {}: {} ghost cells, neighbour counts {:?}",
            me, received, sums
        ))
    })
    .await?;

    for line in reports {
        println!("{}", line);
    }
    Ok(())
}
