//! Rule graph, state resolver, and simulation driver for the Ephemeris
//! simulation.
//!
//! This crate owns the per-agent cycle: read committed history, resolve
//! the next state from producer rules, commit it as a new interval.
//!
//! # Modules
//!
//! - [`clock`] -- Per-agent monotonic clocks.
//! - [`config`] -- Configuration loading from `ephemeris.yaml` into
//!   strongly-typed structs, with the built-in two-body scenario.
//! - [`driver`] -- [`Simulation`]: seeding, iteration, commit, observers.
//! - [`graph`] -- [`GraphBuilder`] and the immutable [`RuleGraph`].
//! - [`producer`] -- [`Producer`] contract, [`ProducerRegistry`], built-in
//!   physics.
//! - [`resolver`] -- [`Resolver::step`] with deadlock detection.
//! - [`runner`] -- Build and run every configured engine.
//!
//! [`Simulation`]: driver::Simulation
//! [`GraphBuilder`]: graph::GraphBuilder
//! [`RuleGraph`]: graph::RuleGraph
//! [`Producer`]: producer::Producer
//! [`ProducerRegistry`]: producer::ProducerRegistry
//! [`Resolver::step`]: resolver::Resolver::step

pub mod clock;
pub mod config;
pub mod driver;
pub mod graph;
pub mod producer;
pub mod resolver;
pub mod runner;
