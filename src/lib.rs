//! splmeter - streaming sound level meter engine
//!
//! A pull-driven signal-processing pipeline that ingests fixed-size audio
//! blocks and evaluates chains of weighting and averaging stages to
//! produce calibrated decibel readings, in the spirit of IEC 61672
//! sound-level-meter behavior.
//!
//! # Architecture
//!
//! - A [`controller::Controller`] supplies stream parameters and blocks.
//! - The [`engine::Engine`] owns named [`bus::Bus`]es, resolves abstract
//!   requirement sequences into concrete stage chains (memoized), and
//!   drives the block loop.
//! - Each bus holds an append-only arena of [`stages::Stage`]s whose
//!   insertion order is a valid topological order; every stage runs
//!   exactly once per block and keeps its filter memory across blocks.
//! - Meter-capable stages expose the [`stages::Meter`] readout: linear
//!   mean-square levels and decibels referenced to 20 uPa.

pub mod block;
pub mod bus;
pub mod cli;
pub mod controller;
pub mod engine;
pub mod error;
pub mod stages;

pub use block::Block;
pub use bus::Bus;
pub use controller::{Controller, WavFileController};
pub use engine::{Engine, StageRegistry};
pub use error::{Result, SlmError};
pub use stages::{
    AsymmetricTimeWeighting, AverageReadout, BlockReadout, FrequencyWeighting, Meter,
    MeterReading, Stage, SymmetricTimeWeighting, TimeAveraging, Upstream, WeightingCurve,
    REFERENCE_PRESSURE,
};
