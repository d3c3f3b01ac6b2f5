// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer generation providers.

pub mod provider;

pub use provider::{CommandGenerator, ExtractiveGenerator, GenerationProvider};
