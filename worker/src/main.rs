use std::{env, io};

use log::{info, warn};

use gt_worker::{Simulation, SimulationConfig};

const DEFAULT_CONFIG: &str = "worker/simulation.json";

fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var("GT_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let config = SimulationConfig::load(&path)?;
    info!("loaded configuration from {path}");

    let mut simulation = Simulation::new(config)?;
    let initial = simulation.global_loss()?;
    info!(loss = initial; "initial global loss");

    let summaries = simulation.run()?;
    let Some(last) = summaries.last() else {
        warn!("no rounds were run");
        return Ok(());
    };

    match last.accuracy {
        Some(accuracy) => println!(
            "rounds: {}, loss: {initial:.6} -> {:.6}, accuracy: {accuracy:.4}",
            summaries.len(),
            last.loss
        ),
        None => println!(
            "rounds: {}, loss: {initial:.6} -> {:.6}",
            summaries.len(),
            last.loss
        ),
    }

    Ok(())
}
