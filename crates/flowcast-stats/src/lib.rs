#![forbid(unsafe_code)]
//! flowcast-stats: the numeric half of the consolidation engine.
//!
//! Everything in this crate is a pure function of its inputs (the Monte-Carlo
//! forecaster included, once seeded). Nothing here touches a database.
//!
//! - [`lead_time`]: percentiles, moments and histograms over lead-time samples
//! - [`throughput`]: gap-free weekly throughput history
//! - [`forecast`]: the [`forecast::Forecaster`] strategy and its Monte-Carlo
//!   implementation
//! - [`score`]: operational risk, flow pressure and WIP

pub mod forecast;
pub mod lead_time;
pub mod score;
pub mod throughput;
