// =============================================================================
// API Module
// =============================================================================
//
// Read-only HTTP surface: liveness, decision history, calibration.

pub mod rest;
