use std::io;

use aya::{maps::MapError, programs::ProgramError, EbpfError};
use thiserror::Error;

/// Agent errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Error when building a flow rule in userspace.
    /// Normally, an oversized text field.
    #[error(transparent)]
    RuleError(#[from] tapflow_common::FlowRuleError),
    // Aya's error seems clear enough to just let them bubble up
    /// Error when inserting into an eBPF map.
    #[error(transparent)]
    MapError(#[from] MapError),
    /// Error while loading an eBPF program.
    #[error(transparent)]
    ProgramError(#[from] ProgramError),
    /// eBPF-related error
    #[error(transparent)]
    EbpfError(#[from] EbpfError),
    /// IO error
    #[error(transparent)]
    IoError(#[from] io::Error),
    /// Rule slot index outside the fixed table.
    #[error("Rule index {0} is outside the rule table")]
    InvalidIndex(u32),
    /// Map name not present in the loaded object.
    #[error("Map {0} not found in the loaded object")]
    MapMissing(&'static str),
    #[error("Record format is erroneous for logging")]
    LogFormatError,
}
