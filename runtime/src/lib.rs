// Copyright 2026 Sitecrawl Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sitecrawl runtime library: resilient crawling of anti-bot protected sites.
//!
//! A run establishes one session per worker, navigates each target in a
//! browser while detecting and recovering from anti-bot interruptions,
//! extracts the profile's fields, and streams results back in input order.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod extraction;
pub mod io;
pub mod navigation;
pub mod pacing;
pub mod profile;
pub mod progress;
pub mod renderer;
pub mod session;

pub use crawl::{CrawlResult, FailureReason, ItemFailure, WorkItem};
pub use error::{CrawlError, Result};
