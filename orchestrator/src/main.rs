use std::{env, io};

use orchestrator::{configs::ConsensusConfig, solve};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let path = env::args().nth(1).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "usage: orchestrator <config.json>")
    })?;

    let config = ConsensusConfig::from_path(&path)?;
    let outcome = solve(config)?;

    if let Some(last) = outcome.residuals.last() {
        log::info!(
            primal = last.primal,
            dual = last.dual,
            stopped = last.stopped;
            "finished after {} outer iteration(s)",
            outcome.residuals.len()
        );
    }

    println!("{}", serde_json::to_string(&outcome.state.xbar)?);
    Ok(())
}
