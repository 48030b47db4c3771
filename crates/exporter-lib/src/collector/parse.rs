//! Parsers for Lustre statistics text
//!
//! Each function turns the raw text of one file into numbers. They do no
//! I/O and hold no state, so they are shared by every collection context.
//!
//! Shapes handled here:
//! - single numeric literal files (`kbytesfree`, `num_exports`, ...)
//! - `health_check`
//! - histogram blocks in `brw_stats` / `rpc_stats`
//! - operation counters in `stats` / `md_stats`
//! - `read_bytes` / `write_bytes` lines in `stats`
//! - the positional `lnet/stats` line

use crate::error::ParseError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Integer or decimal tokens, as printed by the kernel
static NUMBER_TOKEN: OnceLock<Regex> = OnceLock::new();

fn number_regex() -> &'static Regex {
    NUMBER_TOKEN.get_or_init(|| {
        Regex::new(r"[0-9]*\.[0-9]+|[0-9]+").expect("number token pattern is valid")
    })
}

/// Iterate over the numeric tokens of `text` in order
pub fn numeric_tokens(text: &str) -> impl Iterator<Item = &str> {
    number_regex().find_iter(text).map(|m| m.as_str())
}

/// Parse a base-10 floating point token
pub fn parse_float(token: &str) -> Result<f64, ParseError> {
    let token = token.trim();
    token.parse::<f64>().map_err(|source| ParseError::InvalidNumber {
        token: token.to_string(),
        source,
    })
}

/// Which byte-counter line of a `stats` or `job_stats` block to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoField {
    Read,
    Write,
}

impl IoField {
    pub fn key(&self) -> &'static str {
        match self {
            IoField::Read => "read_bytes",
            IoField::Write => "write_bytes",
        }
    }
}

/// Position of a value within `samples, min, max, sum`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoPosition {
    Samples,
    Min,
    Max,
    Sum,
}

impl IoPosition {
    pub fn index(&self) -> usize {
        match self {
            IoPosition::Samples => 0,
            IoPosition::Min => 1,
            IoPosition::Max => 2,
            IoPosition::Sum => 3,
        }
    }
}

/// Number of values carried by a byte-counter line
pub const IO_VALUES: usize = 4;

/// Operation names recognised in `stats` and `md_stats` files
pub const STATS_OPERATIONS: &[&str] = &[
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
    "listxattr",
    "removexattr",
    "statfs",
    "sync",
    "samedir_rename",
    "crossdir_rename",
    "punch",
    "destroy",
    "create",
    "get_info",
    "set_info",
    "set_info_async",
    "quotactl",
    "connect",
    "reconnect",
    "disconnect",
    "ping",
    "seek",
    "readdir",
    "truncate",
    "alloc_inode",
    "inode_permission",
    "fsync",
    "flock",
];

/// Parse a file holding a single number
pub fn parse_scalar(text: &str) -> Result<f64, ParseError> {
    parse_float(text)
}

/// `health_check` reads `healthy` when all targets are fine
pub fn parse_health(text: &str) -> f64 {
    if text.trim() == "healthy" {
        1.0
    } else {
        0.0
    }
}

/// One value extracted from a histogram row
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSample {
    pub operation: &'static str,
    pub size: String,
    pub value: f64,
}

/// Rows of the block whose first line starts with `heading`
///
/// The heading line itself is not returned. The block ends at the first
/// blank line or at the end of the text. `None` when no line matches.
pub fn histogram_block<'a>(text: &'a str, heading: &str) -> Option<Vec<&'a str>> {
    let mut lines = text.lines();
    lines.find(|line| line.starts_with(heading))?;
    Some(
        lines
            .take_while(|line| !line.trim().is_empty())
            .collect(),
    )
}

/// Parse the histogram block named by `heading`
///
/// Rows look like `4K:  12  1  1 | 34  2  2`. The first column is the
/// bucket, the second the read count and the sixth the write count. Rows
/// too short to carry a write column produce only the read sample.
pub fn parse_histogram(text: &str, heading: &str) -> Result<Vec<HistogramSample>, ParseError> {
    let Some(rows) = histogram_block(text, heading) else {
        return Ok(Vec::new());
    };

    let mut samples = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let size = convert_to_bytes(&fields[0].replace(':', ""));
        samples.push(HistogramSample {
            operation: "read",
            size: size.clone(),
            value: parse_float(fields[1])?,
        });
        if fields.len() >= 6 {
            samples.push(HistogramSample {
                operation: "write",
                size,
                value: parse_float(fields[5])?,
            });
        }
    }
    Ok(samples)
}

/// Expand a `K`/`M`/`G`/`T` suffixed bucket into a byte count
///
/// Buckets without a known suffix, or with a non-integer prefix, are
/// returned unchanged.
pub fn convert_to_bytes(size: &str) -> String {
    let Some(unit) = size.chars().last() else {
        return size.to_string();
    };
    let multiplier: u64 = match unit {
        'K' => 1 << 10,
        'M' => 1 << 20,
        'G' => 1 << 30,
        'T' => 1 << 40,
        _ => return size.to_string(),
    };
    match size[..size.len() - 1].parse::<u64>() {
        Ok(n) => n.saturating_mul(multiplier).to_string(),
        Err(_) => size.to_string(),
    }
}

/// Split a line into its key (without the trailing colon) and the rest
fn split_key(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let end = line
        .find(|c: char| c.is_whitespace() || c == ':')
        .unwrap_or(line.len());
    if end == 0 {
        return None;
    }
    let (key, rest) = line.split_at(end);
    Some((key, rest.strip_prefix(':').unwrap_or(rest)))
}

/// Extract recognised operation counters from a `stats`-style file
///
/// Returns `(operation, count)` in file order. Lines whose key is not in
/// `operations` are ignored; the first line for an operation wins.
pub fn parse_operations(
    text: &str,
    operations: &[&'static str],
) -> Result<Vec<(&'static str, f64)>, ParseError> {
    let mut found: Vec<(&'static str, f64)> = Vec::new();
    for line in text.lines() {
        let Some((key, rest)) = split_key(line) else {
            continue;
        };
        let Some(op) = operations.iter().copied().find(|op| *op == key) else {
            continue;
        };
        if found.iter().any(|(seen, _)| *seen == op) {
            continue;
        }
        let token = numeric_tokens(rest)
            .next()
            .ok_or_else(|| ParseError::MissingValue {
                key: op.to_string(),
            })?;
        found.push((op, parse_float(token)?));
    }
    Ok(found)
}

/// Read one value of the `read_bytes`/`write_bytes` line
///
/// Handles both `read_bytes 3 samples [bytes] 4096 8192 12288` and
/// `read_bytes: { samples: 3, unit: bytes, min: 4096, ... }`. A missing
/// line yields `None`.
pub fn parse_io_bytes(
    text: &str,
    field: IoField,
    position: IoPosition,
) -> Result<Option<f64>, ParseError> {
    for line in text.lines() {
        let Some((key, rest)) = split_key(line) else {
            continue;
        };
        if key != field.key() {
            continue;
        }
        let tokens: Vec<&str> = numeric_tokens(rest).take(IO_VALUES).collect();
        if tokens.len() < IO_VALUES {
            return Err(ParseError::TooFewValues {
                key: field.key().to_string(),
                expected: IO_VALUES,
                found: tokens.len(),
            });
        }
        return parse_float(tokens[position.index()]).map(Some);
    }
    Ok(None)
}

/// Number of fields printed in `lnet/stats`
pub const LNET_STATS_FIELDS: usize = 11;

/// Read one positional field of the single-line `lnet/stats` file
///
/// Fields are: allocated, maximum, errors, send_count, receive_count,
/// route_count, drop_count, send_length, receive_length, route_length,
/// drop_length.
pub fn parse_lnet_stats(text: &str, index: usize) -> Result<Option<f64>, ParseError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.is_empty() {
        return Ok(None);
    }
    if fields.len() < LNET_STATS_FIELDS || index >= fields.len() {
        return Err(ParseError::TooFewValues {
            key: "lnet stats".to_string(),
            expected: LNET_STATS_FIELDS,
            found: fields.len(),
        });
    }
    parse_float(fields[index]).map(Some)
}

/// Name of the target a statistics file belongs to
///
/// The target is the directory `depth + 1` levels above the file, with the
/// `filter-` prefix and `_UUID` suffix used by ldlm namespaces removed.
/// `depth` is the number of `/` in the catalogue file name.
pub fn target_from_path(path: &Path, depth: usize) -> Result<String, ParseError> {
    let elements: Vec<String> = path
        .iter()
        .map(|e| e.to_string_lossy().into_owned())
        .collect();
    if elements.len() < depth + 2 {
        return Err(ParseError::ShortPath(path.display().to_string()));
    }
    let name = &elements[elements.len() - 2 - depth];
    let name = name.strip_prefix("filter-").unwrap_or(name);
    let name = name.strip_suffix("_UUID").unwrap_or(name);
    Ok(name.to_string())
}
