//! Stage-graph execution engine.
//!
//! The engine owns the buses, the stage-type registry, the memo set of
//! satisfied requirements, and the bounded execution window. It drives
//! the pull-based block loop: read one block from the controller, hand
//! it to every bus (each evaluates its chain in topological order), then
//! invoke the reporting hook once over all meter readings. Everything is
//! single-threaded and synchronous; one block is fully processed before
//! the next is requested.

mod registry;
mod window;

pub use registry::{StageFactory, StageRegistry};
pub use window::{BlockRecord, ExecutionWindow, DEFAULT_WINDOW_BLOCKS};

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::bus::Bus;
use crate::controller::Controller;
use crate::error::{Result, SlmError};
use crate::stages::{AverageReadout, MeterReading, Upstream, WeightingCurve};

/// Reporting hook: called once per processed block with the block index
/// and every meter reading collected across all buses.
pub type Reporter = Box<dyn FnMut(u64, &[MeterReading])>;

/// The sound-level-meter engine.
pub struct Engine {
    controller: Box<dyn Controller>,
    buses: Vec<Bus>,
    bus_index: HashMap<String, usize>,
    registry: StageRegistry,
    satisfied: HashSet<Vec<String>>,
    window: ExecutionWindow,
    reporter: Option<Reporter>,
    blocks_processed: u64,
}

impl Engine {
    /// Create an engine over a controller, with the default registry and
    /// execution-window bound.
    pub fn new(controller: Box<dyn Controller>) -> Self {
        Self {
            controller,
            buses: Vec::new(),
            bus_index: HashMap::new(),
            registry: StageRegistry::with_defaults(),
            satisfied: HashSet::new(),
            window: ExecutionWindow::default(),
            reporter: None,
            blocks_processed: 0,
        }
    }

    pub fn samplerate(&self) -> u32 {
        self.controller.samplerate()
    }

    pub fn blocksize(&self) -> usize {
        self.controller.blocksize()
    }

    pub fn channels(&self) -> usize {
        self.controller.channels()
    }

    pub fn sensitivity(&self) -> f64 {
        self.controller.sensitivity()
    }

    /// Install the reporting hook, replacing the default log output.
    pub fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = Some(reporter);
    }

    /// Extend the registry with a custom stage constructor.
    pub fn register_stage<F>(&mut self, token: &str, factory: F)
    where
        F: Fn(&crate::stages::StageCtx, String, Upstream) -> Box<dyn crate::stages::Stage>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register_stage(token, factory);
    }

    /// Register a time-averaging stage kind (see
    /// [`StageRegistry::register_averaging`]).
    pub fn register_averaging(&mut self, token: &str, duration: f64, readout: AverageReadout) {
        self.registry.register_averaging(token, duration, readout);
    }

    // ------------------------------------------------------------------
    // Graph construction
    // ------------------------------------------------------------------

    /// Create a bus. The weighting curve defaults to Z (identity).
    pub fn add_bus(&mut self, name: &str, curve: Option<WeightingCurve>) -> Result<&mut Bus> {
        if self.bus_index.contains_key(name) {
            return Err(SlmError::DuplicateBus {
                name: name.to_string(),
            });
        }
        let idx = self.create_bus(name.to_string(), curve.unwrap_or(WeightingCurve::Z));
        Ok(&mut self.buses[idx])
    }

    pub fn get_bus(&self, name: &str) -> Result<&Bus> {
        self.bus_index
            .get(name)
            .map(|&idx| &self.buses[idx])
            .ok_or_else(|| SlmError::UnknownBus {
                name: name.to_string(),
            })
    }

    pub fn get_bus_mut(&mut self, name: &str) -> Result<&mut Bus> {
        match self.bus_index.get(name) {
            Some(&idx) => Ok(&mut self.buses[idx]),
            None => Err(SlmError::UnknownBus {
                name: name.to_string(),
            }),
        }
    }

    /// Construct a registered stage kind on `bus_name`, wired to
    /// `upstream`. Returns the new stage's arena index.
    pub fn add_stage(&mut self, token: &str, bus_name: &str, upstream: Upstream) -> Result<usize> {
        let factory = self.registry.stage(token)?;
        let &idx = self
            .bus_index
            .get(bus_name)
            .ok_or_else(|| SlmError::UnknownBus {
                name: bus_name.to_string(),
            })?;
        Ok(self.buses[idx].add_stage(upstream, |ctx, id, up| factory(ctx, id, up)))
    }

    /// Idempotent chain builder.
    ///
    /// A requirement is an ordered token sequence: a bus selector
    /// followed by stage kinds, e.g. `["A", "fast"]`. Already satisfied
    /// sequences return immediately with no graph mutation. Otherwise the
    /// bus is resolved (or created from the weighting registry), the
    /// existing chain is walked from the root matching kind and wiring,
    /// and the unmatched suffix is appended as fresh stages. Existing
    /// stages are never mutated or replaced: a mismatched token simply
    /// starts a new branch at the walk pointer.
    ///
    /// All tokens are validated against the registry before anything is
    /// created, so a rejected requirement leaves the graph untouched.
    pub fn require<S: AsRef<str>>(&mut self, requirement: &[S]) -> Result<()> {
        let key: Vec<String> = requirement.iter().map(|s| s.as_ref().to_string()).collect();
        if key.is_empty() {
            return Err(SlmError::RequestRejected {
                token: String::new(),
            });
        }
        if self.satisfied.contains(&key) {
            return Ok(());
        }

        // Walk the existing chain, root first.
        let existing = self.bus_index.get(&key[0]).copied();
        let mut ptr = 0usize;
        let mut matched = 0usize;
        if let Some(idx) = existing {
            let bus = &self.buses[idx];
            for token in &key[1..] {
                match bus.find_downstream(ptr, token) {
                    Some(next) => {
                        ptr = next;
                        matched += 1;
                    }
                    None => break,
                }
            }
        }

        // Validate every token we would create before touching the graph.
        if existing.is_none() {
            self.registry.weighting(&key[0])?;
        }
        for token in &key[1 + matched..] {
            self.registry.stage(token)?;
        }

        let bus_idx = match existing {
            Some(idx) => idx,
            None => {
                let curve = self.registry.weighting(&key[0])?;
                self.create_bus(key[0].clone(), curve)
            }
        };

        let registry = &self.registry;
        let bus = &mut self.buses[bus_idx];
        for token in &key[1 + matched..] {
            let factory = registry.stage(token)?;
            ptr = bus.add_stage(Upstream::Stage(ptr), |ctx, id, up| factory(ctx, id, up));
        }

        debug!(
            "requirement {:?} satisfied ({} stage(s) appended)",
            key,
            key.len() - 1 - matched
        );
        self.satisfied.insert(key);
        Ok(())
    }

    fn create_bus(&mut self, name: String, curve: WeightingCurve) -> usize {
        let bus = Bus::new(
            name.clone(),
            self.controller.samplerate(),
            self.controller.blocksize(),
            self.controller.channels(),
            self.controller.sensitivity(),
            curve,
        );
        self.buses.push(bus);
        let idx = self.buses.len() - 1;
        self.bus_index.insert(name, idx);
        idx
    }

    // ------------------------------------------------------------------
    // Block loop
    // ------------------------------------------------------------------

    /// Process blocks until the controller signals end-of-stream.
    ///
    /// End-of-stream is ordinary control flow, not a fault. Controller
    /// I/O errors propagate unretried and terminate the loop.
    pub fn run(&mut self) -> Result<()> {
        while self.process_block()? {}
        info!("stream finished after {} block(s)", self.blocks_processed);
        Ok(())
    }

    /// Process a single block.
    ///
    /// Returns `Ok(false)` on end-of-stream. Callers that must stop
    /// early drive this directly instead of calling [`Engine::run`].
    pub fn process_block(&mut self) -> Result<bool> {
        let Some((block, block_index)) = self.controller.read_block()? else {
            return Ok(false);
        };

        self.window.push(block_index);
        for bus in &mut self.buses {
            bus.process(&block, block_index)?;
        }
        self.blocks_processed += 1;

        let readings: Vec<MeterReading> =
            self.buses.iter().flat_map(|bus| bus.readings()).collect();
        match &mut self.reporter {
            Some(reporter) => reporter(block_index, &readings),
            None => {
                for reading in &readings {
                    let db: Vec<String> =
                        reading.db.iter().map(|v| format!("{v:.1}")).collect();
                    info!(
                        "block {}: {}[{}]: {} dB",
                        block_index,
                        reading.stage,
                        reading.kind,
                        db.join(", ")
                    );
                }
            }
        }
        Ok(true)
    }

    /// Reset every bus and clear the execution window, as for a stream
    /// restart. The graph and the satisfied-requirement set stay intact.
    pub fn reset(&mut self) {
        for bus in &mut self.buses {
            bus.reset();
        }
        self.window.clear();
        self.blocks_processed = 0;
    }

    /// Recent-block diagnostics window.
    pub fn window(&self) -> &ExecutionWindow {
        &self.window
    }

    /// Total blocks processed since construction or the last reset.
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }
}
