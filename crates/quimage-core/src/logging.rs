//! Verbosity levels and diagnostic formatting.
//!
//! The library only emits [`tracing`] events; installing a subscriber is the
//! binary's job. How much the composer and decoder say is decided by the
//! [`Verbosity`] carried in each call's [`CodecConfig`], never by
//! process-wide state.
//!
//! The two levels below `Debug` exist for matrix dumps:
//!
//! | Level   | Emits                                                  |
//! |---------|--------------------------------------------------------|
//! | `Math`  | the global operator `G` and the orthonormalized `U`    |
//! | `State` | per-coordinate basis vectors, map blocks, init state   |
//! | `Trace` | everything above plus per-bitstring decoder activity   |
//!
//! [`CodecConfig`]: crate::config::CodecConfig

use std::fmt::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::Operator;

/// Diagnostic verbosity, from quietest to loudest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Errors only
    Error,
    /// Policy fallbacks and other recoverable anomalies
    Warning,
    /// One line per encode / retrieve
    Info,
    /// Resolution and loading steps
    Debug,
    /// Global operator dumps
    Math,
    /// Per-coordinate state dumps
    State,
    /// Everything
    Trace,
}

impl Default for Verbosity {
    fn default() -> Self {
        Self::Error
    }
}

impl Verbosity {
    /// Map a repeated `-v` flag count to a level (`0` is `Error`, `6+` is `Trace`).
    #[must_use]
    pub const fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Self::Error,
            1 => Self::Warning,
            2 => Self::Info,
            3 => Self::Debug,
            4 => Self::Math,
            5 => Self::State,
            _ => Self::Trace,
        }
    }

    /// `true` when `self` is at least as loud as `level`.
    #[inline]
    #[must_use]
    pub fn allows(self, level: Verbosity) -> bool {
        self >= level
    }

    /// The matching `EnvFilter` directive for a `tracing-subscriber` setup.
    #[must_use]
    pub const fn tracing_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Math | Self::State | Self::Trace => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Math => "math",
            Self::State => "state",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "math" => Ok(Self::Math),
            "state" => Ok(Self::State),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown verbosity level '{other}'")),
        }
    }
}

/// Render a complex matrix as an aligned table, one row per line.
///
/// Entries whose magnitude is below `1e-12` print as `0`.
#[must_use]
pub fn tabulate_complex(op: &Operator) -> String {
    let cells: Vec<Vec<String>> = (0..op.nrows())
        .map(|i| {
            (0..op.ncols())
                .map(|j| {
                    let z = op[(i, j)];
                    if z.norm() < 1e-12 {
                        "0".to_string()
                    } else if z.im.abs() < 1e-12 {
                        format!("{:.4}", z.re)
                    } else {
                        format!("{:.4}{:+.4}i", z.re, z.im)
                    }
                })
                .collect()
        })
        .collect();

    let width = cells
        .iter()
        .flat_map(|row| row.iter().map(String::len))
        .max()
        .unwrap_or(1);

    let mut out = String::new();
    for row in &cells {
        for (j, cell) in row.iter().enumerate() {
            if j > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{cell:>width$}");
        }
        out.push('\n');
    }
    out
}
