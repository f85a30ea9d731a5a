// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Stateflow runtime: drives real browsers through a web application and
//! records every distinct DOM state it reaches in a [`stateflow::StateFlowGraph`].
//!
//! The library is what the `stateflow` binary runs; integration tests drive
//! it with a scripted in-memory browser.

#![allow(clippy::new_without_default)]

pub mod condition;
pub mod config;
pub mod constraints;
pub mod controller;
pub mod coverage;
pub mod crawler;
pub mod error;
pub mod events;
pub mod extraction;
pub mod guided;
pub mod pool;
pub mod productivity;
pub mod queue;
pub mod renderer;
pub mod selector;
pub mod session;
pub mod state_machine;
pub mod stats;
pub mod strip;
