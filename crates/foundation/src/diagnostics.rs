use tracing::warn;

/// Kind of problem the engine recovered from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A referenced catalog id does not exist.
    LookupMiss,
    /// A configuration entry could not be interpreted and was skipped.
    MalformedConfigEntry,
    /// A catalog record could not be parsed and was skipped.
    MalformedRecord,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::LookupMiss => "lookup_miss",
            WarningKind::MalformedConfigEntry => "malformed_config_entry",
            WarningKind::MalformedRecord => "malformed_record",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

/// Operator-facing warning log.
///
/// Every warning is forwarded to `tracing` and kept in order so callers can
/// surface or assert on them after a build.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        warn!(kind = kind.as_str(), "{message}");
        self.warnings.push(Warning { kind, message });
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}
