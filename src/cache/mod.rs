//! Build cache: BLAKE3 hashing, staleness detection, build event log.

pub mod eventlog;
pub mod hasher;
pub mod staleness;
