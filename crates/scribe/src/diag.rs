//! Structured diagnostics.
//!
//! Passes report errors and warnings into a single [`Diagnostics`] sink and
//! signal failure upward with the zero-sized [`Halted`] token. The sink is
//! bounded: once `max_errors` errors have been recorded further errors are
//! dropped and [`Diagnostics::at_limit`] turns true, which aborts the run.

use strum::Display;

use crate::loc::{ModuleLoc, SourceMap};

/// Default ceiling on recorded errors before compilation aborts.
pub const DEFAULT_MAX_ERRORS: usize = 10;

/// Marker returned by a pass once it has reported an error for its subtree.
///
/// The diagnostic itself lives in the sink; this token only unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Halted;

pub(crate) type SemResult<T> = Result<T, Halted>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diag {
    pub loc: Option<ModuleLoc>,
    pub severity: Severity,
    pub message: String,
}

/// Bounded error/warning collector.
pub struct Diagnostics {
    diags: Vec<Diag>,
    max_errors: usize,
    errors: usize,
}

impl Diagnostics {
    pub fn new(max_errors: usize) -> Self {
        Self {
            diags: Vec::new(),
            max_errors,
            errors: 0,
        }
    }

    pub fn set_max_errors(&mut self, max_errors: usize) {
        self.max_errors = max_errors;
    }

    pub(crate) fn error(&mut self, loc: Option<ModuleLoc>, message: impl Into<String>) -> Halted {
        if self.errors < self.max_errors {
            self.diags.push(Diag {
                loc,
                severity: Severity::Error,
                message: message.into(),
            });
        }
        self.errors += 1;
        Halted
    }

    pub(crate) fn warn(&mut self, loc: Option<ModuleLoc>, message: impl Into<String>) {
        self.diags.push(Diag {
            loc,
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn at_limit(&self) -> bool {
        self.errors >= self.max_errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diag> {
        self.diags.iter()
    }

    /// Renders every diagnostic as `path:line:col: severity: message`, one
    /// per line. Diagnostics without a location omit the path prefix.
    pub fn render(&self, srcmap: &SourceMap) -> String {
        let mut out = String::new();
        for d in &self.diags {
            match d.loc {
                Some(loc) => {
                    out.push_str(&srcmap.loc_str(loc));
                    out.push_str(": ");
                }
                None => {}
            }
            out.push_str(&d.severity.to_string());
            out.push_str(": ");
            out.push_str(&d.message);
            out.push('\n');
        }
        out
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_limit_is_enforced() {
        let mut diags = Diagnostics::new(2);
        diags.error(None, "one");
        assert!(!diags.at_limit());
        diags.error(None, "two");
        assert!(diags.at_limit());
        diags.error(None, "three");
        assert_eq!(diags.error_count(), 3);
        // the third error is counted but not stored
        assert_eq!(diags.iter().count(), 2);
    }
}
