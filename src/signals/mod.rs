// =============================================================================
// Signals Module
// =============================================================================
//
// Probability pipeline for the decision loop:
// - Per-bar feature extraction and scaling
// - Rolling-window price model (retrained every evaluation)
// - Fusion of model output with sentiment into an action

pub mod features;
pub mod fusion;
pub mod model;

pub use fusion::{classify, FusionEngine};
