//! Shared core of the sports tournament scheduling experiments.
//!
//! The pipeline is the same for all four modeling paradigms: the circle
//! method fixes the round-robin pairings, the paradigm-neutral
//! [`model::ConstraintModel`] describes the period-assignment problem over
//! them, one of the [`encodings`] turns the model into a solver artifact, a
//! [`backend::SolverBackend`] runs the external solver under a wall-clock
//! ceiling, and the matching decoder plus [`schedule`] validation normalize
//! the answer into one canonical [`result::SolverResult`] record.

pub mod backend;
pub mod encodings;
pub mod error;
pub mod model;
pub mod result;
pub mod round_robin;
pub mod runner;
pub mod schedule;

pub use error::StsError;
pub use error::StsResult;
