//! valhalla-bridge CLI library.
//!
//! Argument parsing helpers, logging setup and route rendering used by the
//! `valhalla-bridge` binary.

pub mod args;
pub mod logging;
pub mod output;
