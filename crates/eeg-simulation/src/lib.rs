//! EEG-Simulation: synthetic multichannel EEG recordings
//!
//! Deterministic rhythm patterns plus seeded Gaussian noise, for tests,
//! benchmarks and demo data.

pub mod eeg_simulator;
pub mod signal_patterns;

pub use eeg_simulator::*;
pub use signal_patterns::*;
