//! Library side of the `dicom2bids` binary: argument parsing, logging setup
//! and the subcommand handlers.

#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;
