//! Per-job statistics from `job_stats` files
//!
//! A `job_stats` file lists one block per job:
//!
//! ```text
//! job_stats:
//! - job_id:          dd.0
//!   snapshot_time:   1652255649
//!   read_bytes:      { samples: 0, unit: bytes, min: 0, max: 0, sum: 0 }
//!   write_bytes:     { samples: 10, unit: bytes, min: 1, max: 5, sum: 20 }
//!   punch:           { samples: 4, unit: reqs }
//! ```
//!
//! Parsed blocks are stored in buffers borrowed from a [`JobStatsPool`] and
//! handed back when the owning collection context is released.

use super::parse::{numeric_tokens, IoField, IoPosition, IO_VALUES};
use crate::error::ParseError;
use std::sync::Mutex;
use tracing::warn;

/// Scalar counters tracked per job, in slot order
pub const JOB_OPERATIONS: [&str; 22] = [
    "open",
    "close",
    "mknod",
    "link",
    "unlink",
    "mkdir",
    "rmdir",
    "rename",
    "getattr",
    "setattr",
    "getxattr",
    "setxattr",
    "statfs",
    "sync",
    "samedir_rename",
    "crossdir_rename",
    "punch",
    "destroy",
    "create",
    "get_info",
    "set_info",
    "quotactl",
];

/// Separator in front of every job block
const JOB_SEPARATOR: &str = "- ";

const JOB_ID_KEY: &str = "job_id:";

fn operation_slot(key: &str) -> Option<usize> {
    JOB_OPERATIONS.iter().position(|op| *op == key)
}

/// Counters of one job
///
/// Counters missing from the source text stay `None` and are never
/// exported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobState {
    pub job_id: String,
    pub read_bytes: Option<[u64; IO_VALUES]>,
    pub write_bytes: Option<[u64; IO_VALUES]>,
    pub operations: [Option<u64>; JOB_OPERATIONS.len()],
}

impl JobState {
    /// Clear every counter, keeping the `job_id` allocation
    pub fn reset(&mut self) {
        self.job_id.clear();
        self.read_bytes = None;
        self.write_bytes = None;
        self.operations = [None; JOB_OPERATIONS.len()];
    }

    /// Fill this state from one job block
    ///
    /// The first line must carry `job_id:`. Keys other than the tracked
    /// counters are ignored.
    pub fn parse_from_text(&mut self, block: &str) -> Result<(), ParseError> {
        self.reset();

        let mut lines = block.lines();
        let first = lines.next().unwrap_or_default();
        let Some(idx) = first.find(JOB_ID_KEY) else {
            return Err(ParseError::MissingJobId {
                line: first.trim().to_string(),
            });
        };
        self.job_id
            .push_str(first[idx + JOB_ID_KEY.len()..].trim());

        for line in lines {
            let Some(idx) = line.find(':') else {
                continue;
            };
            if idx == 0 {
                continue;
            }
            let key = line[..idx].trim();
            let rest = &line[idx + 1..];

            match key {
                "read_bytes" => self.read_bytes = Some(parse_io_values(key, rest)?),
                "write_bytes" => self.write_bytes = Some(parse_io_values(key, rest)?),
                _ => {
                    if let Some(slot) = operation_slot(key) {
                        self.operations[slot] = Some(parse_first_value(key, rest)?);
                    }
                }
            }
        }

        Ok(())
    }

    /// Present operation counters in slot order
    pub fn operation_counters(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        JOB_OPERATIONS
            .iter()
            .zip(self.operations.iter())
            .filter_map(|(op, value)| value.map(|v| (*op, v)))
    }

    /// Counter by operation name
    pub fn operation(&self, name: &str) -> Option<u64> {
        operation_slot(name).and_then(|slot| self.operations[slot])
    }

    /// One value of the read or write byte tuple
    pub fn io_value(&self, field: IoField, position: IoPosition) -> Option<u64> {
        let values = match field {
            IoField::Read => self.read_bytes,
            IoField::Write => self.write_bytes,
        }?;
        Some(values[position.index()])
    }
}

fn parse_integer(key: &str, token: &str) -> Result<u64, ParseError> {
    token
        .trim()
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidInteger {
            key: key.to_string(),
            token: token.to_string(),
        })
}

fn parse_first_value(key: &str, rest: &str) -> Result<u64, ParseError> {
    let token = numeric_tokens(rest)
        .next()
        .ok_or_else(|| ParseError::MissingValue {
            key: key.to_string(),
        })?;
    parse_integer(key, token)
}

fn parse_io_values(key: &str, rest: &str) -> Result<[u64; IO_VALUES], ParseError> {
    let mut values = [0u64; IO_VALUES];
    let mut found = 0;
    for token in numeric_tokens(rest).take(IO_VALUES) {
        values[found] = parse_integer(key, token)?;
        found += 1;
    }
    if found < IO_VALUES {
        return Err(ParseError::TooFewValues {
            key: key.to_string(),
            expected: IO_VALUES,
            found,
        });
    }
    Ok(values)
}

/// Reusable storage for the jobs of one file
///
/// Slots past `len` keep their allocations from a previous use and are
/// overwritten in place.
#[derive(Debug, Default)]
pub struct JobStatsBuf {
    slots: Vec<JobState>,
    len: usize,
}

impl JobStatsBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed jobs
    pub fn jobs(&self) -> &[JobState] {
        &self.slots[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget the parsed jobs while keeping slot allocations
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Total slots held, used or not
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Parse one job block into the next free slot
    ///
    /// On error the slot is left unused.
    pub fn push_block(&mut self, block: &str) -> Result<&JobState, ParseError> {
        if self.len == self.slots.len() {
            self.slots.push(JobState::default());
        }
        self.slots[self.len].parse_from_text(block)?;
        self.len += 1;
        Ok(&self.slots[self.len - 1])
    }
}

/// Parse a whole `job_stats` file into `buf`
///
/// A block that fails to parse is logged and skipped so that one malformed
/// job does not hide the others. Returns the number of skipped blocks.
pub fn parse_job_stats(content: &str, buf: &mut JobStatsBuf) -> usize {
    let mut skipped = 0;
    for block in content.split(JOB_SEPARATOR).skip(1) {
        if let Err(e) = buf.push_block(block) {
            warn!(error = %e, "Skipping unparsable job_stats entry");
            skipped += 1;
        }
    }
    skipped
}

/// Default number of idle buffers kept by a pool
pub const DEFAULT_POOL_RETAIN: usize = 256;

/// Free list of job buffers shared by concurrent workers
///
/// Buffers are acquired while a context parses `job_stats` files and are
/// only returned from the context's `release()`, after its last reader.
#[derive(Debug)]
pub struct JobStatsPool {
    free: Mutex<Vec<JobStatsBuf>>,
    retain: usize,
}

impl Default for JobStatsPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_RETAIN)
    }
}

impl JobStatsPool {
    /// Create a pool keeping at most `retain` idle buffers
    pub fn new(retain: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            retain,
        }
    }

    /// Take an empty buffer, reusing a returned one when available
    pub fn acquire(&self) -> JobStatsBuf {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        let mut buf = free.pop().unwrap_or_default();
        buf.clear();
        buf
    }

    /// Give a buffer back
    pub fn recycle(&self, mut buf: JobStatsBuf) {
        buf.clear();
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.retain {
            free.push(buf);
        }
    }

    /// Number of idle buffers
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
