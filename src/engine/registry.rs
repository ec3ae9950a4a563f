//! Closed stage-type registry.
//!
//! Requirement tokens resolve through an explicit map from identifier to
//! constructor, populated once at startup. Looking up an unregistered
//! identifier fails with `RequestRejected`; there is no open-ended
//! dynamic dispatch.

use std::collections::HashMap;

use crate::error::{Result, SlmError};
use crate::stages::{
    AsymmetricTimeWeighting, AverageReadout, BlockReadout, Stage, StageCtx,
    SymmetricTimeWeighting, TimeAveraging, Upstream, WeightingCurve,
};

/// Constructor for one registered stage kind.
pub type StageFactory = Box<dyn Fn(&StageCtx, String, Upstream) -> Box<dyn Stage> + Send + Sync>;

/// Token-to-constructor maps for stages and bus weighting curves.
pub struct StageRegistry {
    stages: HashMap<String, StageFactory>,
    weightings: HashMap<String, WeightingCurve>,
}

impl StageRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
            weightings: HashMap::new(),
        }
    }

    /// Registry with the standard sound-level-meter vocabulary:
    /// weighting tokens `A`, `C`, `Z` and time-weighting tokens `fast`,
    /// `slow`, `impulse`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_weighting("A", WeightingCurve::A);
        registry.register_weighting("C", WeightingCurve::C);
        registry.register_weighting("Z", WeightingCurve::Z);

        registry.register_stage("fast", |ctx, id, upstream| {
            Box::new(SymmetricTimeWeighting::fast(
                ctx,
                id,
                upstream,
                BlockReadout::Last,
            ))
        });
        registry.register_stage("slow", |ctx, id, upstream| {
            Box::new(SymmetricTimeWeighting::slow(
                ctx,
                id,
                upstream,
                BlockReadout::Last,
            ))
        });
        registry.register_stage("impulse", |ctx, id, upstream| {
            Box::new(AsymmetricTimeWeighting::impulse(
                ctx,
                id,
                upstream,
                BlockReadout::Last,
            ))
        });
        registry
    }

    /// Register a stage constructor under `token`.
    pub fn register_stage<F>(&mut self, token: &str, factory: F)
    where
        F: Fn(&StageCtx, String, Upstream) -> Box<dyn Stage> + Send + Sync + 'static,
    {
        self.stages.insert(token.to_string(), Box::new(factory));
    }

    /// Register a time-averaging stage under `token` with a fixed
    /// duration and reduction, e.g. `register_averaging("eq1s", 1.0,
    /// AverageReadout::Mean)`.
    pub fn register_averaging(&mut self, token: &str, duration: f64, readout: AverageReadout) {
        let kind = token.to_string();
        self.register_stage(token, move |ctx, id, upstream| {
            Box::new(TimeAveraging::new(
                ctx, id, upstream, &kind, duration, readout,
            ))
        });
    }

    /// Map a weighting token to a curve for bus creation.
    pub fn register_weighting(&mut self, token: &str, curve: WeightingCurve) {
        self.weightings.insert(token.to_string(), curve);
    }

    /// Resolve a stage token.
    pub fn stage(&self, token: &str) -> Result<&StageFactory> {
        self.stages
            .get(token)
            .ok_or_else(|| SlmError::RequestRejected {
                token: token.to_string(),
            })
    }

    /// Resolve a weighting token.
    pub fn weighting(&self, token: &str) -> Result<WeightingCurve> {
        self.weightings
            .get(token)
            .copied()
            .ok_or_else(|| SlmError::RequestRejected {
                token: token.to_string(),
            })
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StageCtx {
        StageCtx {
            samplerate: 48000,
            blocksize: 1024,
            channels: 1,
            sensitivity: 1.0,
        }
    }

    #[test]
    fn defaults_cover_the_standard_vocabulary() {
        let registry = StageRegistry::with_defaults();
        for token in ["fast", "slow", "impulse"] {
            assert!(registry.stage(token).is_ok(), "missing '{token}'");
        }
        for token in ["A", "C", "Z"] {
            assert!(registry.weighting(token).is_ok(), "missing '{token}'");
        }
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let registry = StageRegistry::with_defaults();
        let err = registry.stage("peak-hold").err().unwrap();
        assert!(matches!(err, SlmError::RequestRejected { .. }));
        assert!(registry.weighting("B").is_err());
    }

    #[test]
    fn built_stages_answer_to_their_token() {
        let mut registry = StageRegistry::with_defaults();
        registry.register_averaging("eq1s", 1.0, AverageReadout::Mean);

        let factory = registry.stage("eq1s").unwrap();
        let stage = factory(&ctx(), "Z2".into(), Upstream::Stage(0));
        assert_eq!(stage.kind(), "eq1s");
        assert_eq!(stage.id(), "Z2");

        let factory = registry.stage("fast").unwrap();
        let stage = factory(&ctx(), "Z3".into(), Upstream::Stage(0));
        assert_eq!(stage.kind(), "fast");
    }
}
