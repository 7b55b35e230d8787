//! Sampler DSP: voice playback, envelopes, filters and the master effect
//! chain.
//!
//! Everything here is allocation-free once constructed, so the same code
//! runs inside a native host callback and inside an AudioWorklet.

pub mod delay;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod reverb;
pub mod sampler;

pub use engine::SamplerEngine;
