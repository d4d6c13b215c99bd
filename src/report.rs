//! Non-fatal findings collected while a pipeline runs
//!
//! Every notice is forwarded to the `log` facade as it is recorded and kept so
//! callers can inspect what was reported once the pipeline returns. Fatal
//! conditions never go through here; they are returned as [`SpareError`].
//!
//! [`SpareError`]: crate::core::SpareError

use log::Level;
use std::fmt;

/// A single finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Ordered list of notices from one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    notices: Vec<Notice>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(Level::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(Level::Warn, message.into());
    }

    fn record(&mut self, level: Level, message: String) {
        log::log!(level, "{}", message);
        self.notices.push(Notice { level, message });
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter().filter(|n| n.level == Level::Warn)
    }

    /// True if some warning's message contains `needle`
    pub fn has_warning(&self, needle: &str) -> bool {
        self.warnings().any(|n| n.message.contains(needle))
    }

    /// True if some informational note's message contains `needle`
    pub fn has_info(&self, needle: &str) -> bool {
        self.notices
            .iter()
            .any(|n| n.level == Level::Info && n.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_keep_order_and_level() {
        let mut diag = Diagnostics::new();
        diag.info("dropped 3 rows");
        diag.warn("small group");

        assert_eq!(diag.len(), 2);
        assert_eq!(diag.notices()[0].level, Level::Info);
        assert_eq!(diag.notices()[1].to_string(), "[WARN] small group");
        assert!(diag.has_warning("small"));
        assert!(!diag.has_warning("dropped"));
        assert!(diag.has_info("dropped"));
    }
}
