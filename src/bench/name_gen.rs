//! Time-ordered node names.
//!
//! Names are version-7 UUIDs from `Uuid::now_v7`, which draws from a
//! process-wide context so ids issued within one process are strictly
//! ordered even across threads. The generator itself only checks that a
//! clock and an entropy source are usable before the run starts.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::error::{BenchError, Result};

/// Concurrent, collision-free name source shared by all jobs of a run.
#[derive(Debug)]
pub struct NameGenerator {
    _private: (),
}

impl NameGenerator {
    pub fn new() -> Result<Self> {
        OsRng
            .try_fill_bytes(&mut [0u8; 16])
            .map_err(|e| BenchError::GeneratorExhaustion(format!("no entropy source: {}", e)))?;
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BenchError::GeneratorExhaustion(format!("system clock before 1970: {}", e)))?;
        Ok(Self { _private: () })
    }

    pub fn next(&self) -> Uuid {
        Uuid::now_v7()
    }

    /// Next name as a hyphenated string.
    pub fn next_name(&self) -> String {
        self.next().hyphenated().to_string()
    }
}
