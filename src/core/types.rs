use serde::{Deserialize, Serialize};
use std::fmt;

/// First value issued in a fresh namespace.
pub const DEFAULT_START: u64 = 1;

/// Default hard ceiling per namespace. Allocation fails once the
/// ceiling has been issued.
pub const DEFAULT_MAX: u64 = 999;

/// Per-namespace allocation rules: where the sequence starts, where it
/// must stop, and how issued values are rendered for display.
///
/// # Examples
///
/// ```
/// use seqcode::NamespaceConfig;
///
/// let config = NamespaceConfig::new()
///     .max(999)
///     .prefix("CL")
///     .pad_width(3);
///
/// assert_eq!(config.render(7), "CL-007");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// First value the namespace issues
    pub start: u64,

    /// Highest value the namespace may ever issue (inclusive)
    pub max: u64,

    /// Optional display prefix, e.g. "CL" for client codes
    pub prefix: Option<String>,

    /// Zero-pad width for the rendered value; 0 disables padding
    pub pad_width: usize,
}

impl NamespaceConfig {
    pub fn new() -> Self {
        Self {
            start: DEFAULT_START,
            max: DEFAULT_MAX,
            prefix: None,
            pad_width: 0,
        }
    }

    /// Set the first value to issue
    pub fn start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Set the inclusive ceiling
    pub fn max(mut self, max: u64) -> Self {
        self.max = max;
        self
    }

    /// Set the display prefix
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Set the zero-pad width for rendered codes
    pub fn pad_width(mut self, width: usize) -> Self {
        self.pad_width = width;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.start == 0 {
            return Err("start must be >= 1".to_string());
        }
        if self.max < self.start {
            return Err(format!(
                "max ({}) must not be below start ({})",
                self.max, self.start
            ));
        }
        Ok(())
    }

    /// Render a value as a display code, applying prefix and padding.
    pub fn render(&self, value: u64) -> String {
        let digits = if self.pad_width > 0 {
            format!("{:0width$}", value, width = self.pad_width)
        } else {
            value.to_string()
        };
        match &self.prefix {
            Some(prefix) => format!("{}-{}", prefix, digits),
            None => digits,
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable per-namespace counter state.
///
/// `last_issued` is `None` until the namespace hands out its first value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub last_issued: Option<u64>,
}

impl SequenceState {
    pub fn new() -> Self {
        Self { last_issued: None }
    }

    /// The value the next allocation would return, or `None` when the
    /// namespace is exhausted.
    pub fn next_value(&self, config: &NamespaceConfig) -> Option<u64> {
        let next = match self.last_issued {
            None => config.start,
            Some(last) => last.checked_add(1)?,
        };
        if next > config.max { None } else { Some(next) }
    }

    /// Raise the high-water mark. Never lowers it; returns the new mark
    /// if it changed.
    pub fn raise_to(&mut self, value: u64) -> Option<u64> {
        match self.last_issued {
            Some(last) if last >= value => None,
            _ => {
                self.last_issued = Some(value);
                Some(value)
            }
        }
    }
}

/// An issued code: the namespace it belongs to, the raw value, and the
/// rendered display form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub namespace: String,
    pub value: u64,
    pub display: String,
}

impl Code {
    pub fn new(namespace: &str, value: u64, config: &NamespaceConfig) -> Self {
        Self {
            namespace: namespace.to_string(),
            value,
            display: config.render(value),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}
