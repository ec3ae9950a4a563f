//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use chrono::Utc;
use log::info;

use crate::controller::WavFileController;
use crate::engine::Engine;
use crate::error::Result;
use crate::stages::AverageReadout;

/// Run the meter over a WAV file.
pub fn measure(
    file: &Path,
    blocksize: usize,
    chains: &[String],
    sensitivity: f64,
    leq: Option<f64>,
    json: bool,
) -> Result<()> {
    info!("Measuring: {}", file.display());

    let mut controller = WavFileController::open(file, blocksize)?;
    controller.set_sensitivity(sensitivity);
    let mut engine = Engine::new(Box::new(controller));

    let default_chain = "Z,fast".to_string();
    let chains: Vec<&String> = if chains.is_empty() {
        vec![&default_chain]
    } else {
        chains.iter().collect()
    };

    if let Some(duration) = leq {
        engine.register_averaging("eq", duration, AverageReadout::Mean);
    }

    for chain in &chains {
        let tokens: Vec<&str> = chain.split(',').map(str::trim).collect();
        engine.require(&tokens)?;
        if leq.is_some() {
            engine.require(&[tokens[0], "eq"])?;
        }
    }

    engine.set_reporter(Box::new(move |block_index, readings| {
        if json {
            let line = serde_json::json!({
                "time": Utc::now().to_rfc3339(),
                "block": block_index,
                "readings": readings,
            });
            println!("{line}");
        } else {
            for reading in readings {
                let db: Vec<String> = reading
                    .db
                    .iter()
                    .map(|v| {
                        if v.is_finite() {
                            format!("{v:.1}")
                        } else {
                            "-inf".to_string()
                        }
                    })
                    .collect();
                println!(
                    "block {:>6}  {:<8} [{:<10}] {} dB",
                    block_index,
                    reading.stage,
                    reading.kind,
                    db.join(", ")
                );
            }
        }
    }));

    engine.run()?;
    info!("Processed {} block(s)", engine.blocks_processed());
    Ok(())
}
