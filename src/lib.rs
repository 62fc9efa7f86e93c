//! Kumiki core library.
//!
//! This library describes the build of the decompiler frontend as a graph
//! of steps and executes the part of that graph behind a named entry point.
//! Construction ([`graph::GraphBuilder`]) is pure; execution
//! ([`runner::StepRunner`]) performs all I/O.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod graph;
pub mod hasher;
pub mod layout;
pub mod project;
pub mod runner;
pub mod toolchain;
