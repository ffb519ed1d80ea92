//! Broadcast demo - the root distributes a run configuration.
//!
//! This example demonstrates:
//! - Packing mixed values, including a serde struct, into one buffer
//! - Two-pass sizing and allocation through `CommBroadcast::pack_with`
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=commwire=trace cargo run --example broadcast
//! ```

use commwire::codec::MsgPack;
use commwire::transport::{LocalGroup, Transport};
use commwire::CommBroadcast;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Settings every rank needs before the first step.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct RunSettings {
    name: String,
    steps: u32,
    tolerance: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = RunSettings {
        name: "heat-2d".to_string(),
        steps: 500,
        tolerance: 1e-6,
    };

    let seen = LocalGroup::run(4, move |t| {
        let settings = MsgPack(settings.clone());
        async move {
            let mut bcast = CommBroadcast::new(&t, 0)?;
            bcast
                .pack_with(|buf| {
                    buf.pack(&settings)?.pack(&vec![0.0f64, 1.0, 0.5])?;
                    Ok(())
                })
                .await?;

            let buf = bcast.recv_buffer();
            let received: MsgPack<RunSettings> = buf.unpack()?;
            let boundary: Vec<f64> = buf.unpack()?;
            Ok((t.rank(), received.into_inner(), boundary))
        }
    })
    .await?;

    for (rank, settings, boundary) in seen {
        println!("rank {}: {:?} boundary {:?}", rank, settings, boundary);
    }
    Ok(())
}
