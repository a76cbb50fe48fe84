// Copyright (c) The fallwatch Authors.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The Worker and the Device Agent facade: the top-level crate that wires
//! the Detector Client, Track Registry, Fall State Machine, and Frame
//! Sampler/Queue into one per-camera processing core.

mod agent;
mod config;
mod diagnostics;
pub mod logging;
mod pixel;
mod worker;

pub use agent::DeviceAgent;
pub use config::AgentConfig;
pub use diagnostics::Throttle;
pub use fallwatch_hostsdk::HostPixelFormat;
pub use worker::Worker;
