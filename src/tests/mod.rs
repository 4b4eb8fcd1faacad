//! # Station and Adapter Test Suite
//!
//! Exercises the controller end to end against an in-memory data source and a
//! hand-set clock, so no test touches the network or depends on wall-clock time.
