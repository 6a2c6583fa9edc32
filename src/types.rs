use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a prefix label is padded when it is shorter than the prefix width.
///
/// - `Left`: label first, fill on the right (default).
/// - `Right`: fill first, label on the right.
/// - `Center`: `floor(n/2)` fill before, `ceil(n/2)` after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixAlign {
    Left,
    Right,
    Center,
}

impl Default for PrefixAlign {
    fn default() -> Self {
        PrefixAlign::Left
    }
}

impl FromStr for PrefixAlign {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(PrefixAlign::Left),
            "right" => Ok(PrefixAlign::Right),
            "center" => Ok(PrefixAlign::Center),
            other => Err(format!(
                "invalid prefix_align: {other} (expected \"left\", \"right\" or \"center\")"
            )),
        }
    }
}

/// The single placeholder a prefix template may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixKey {
    Index,
    Pid,
    Command,
    Timestamp,
    Group,
}

impl PrefixKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrefixKey::Index => "index",
            PrefixKey::Pid => "pid",
            PrefixKey::Command => "command",
            PrefixKey::Timestamp => "timestamp",
            PrefixKey::Group => "group",
        }
    }

    /// Keys whose value is padded to the shared prefix width.
    pub fn is_width_bound(&self) -> bool {
        matches!(self, PrefixKey::Command | PrefixKey::Group)
    }
}

impl FromStr for PrefixKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(PrefixKey::Index),
            "pid" => Ok(PrefixKey::Pid),
            "command" => Ok(PrefixKey::Command),
            "timestamp" => Ok(PrefixKey::Timestamp),
            "group" => Ok(PrefixKey::Group),
            other => Err(format!("unknown prefix placeholder: {{{other}}}")),
        }
    }
}

/// The three teardown signals the runtime handles and forwards.
///
/// Raw values are the POSIX numbers, which is also what
/// `ExitStatusExt::signal()` reports on unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownSignal {
    Interrupt,
    Hangup,
    Terminate,
}

impl TeardownSignal {
    pub fn as_raw(&self) -> i32 {
        match self {
            TeardownSignal::Hangup => 1,
            TeardownSignal::Interrupt => 2,
            TeardownSignal::Terminate => 15,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(TeardownSignal::Hangup),
            2 => Some(TeardownSignal::Interrupt),
            15 => Some(TeardownSignal::Terminate),
            _ => None,
        }
    }
}

impl Default for TeardownSignal {
    fn default() -> Self {
        TeardownSignal::Terminate
    }
}

impl fmt::Display for TeardownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownSignal::Interrupt => "SIGINT",
            TeardownSignal::Hangup => "SIGHUP",
            TeardownSignal::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// Which pipe an output line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}
