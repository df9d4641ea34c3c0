//! Compiler tracing.
//!
//! A [`Tracer`] receives coarse progress events (module loads, pass starts,
//! template instantiations). The default is [`NoopTracer`]; the CLI wires a
//! [`StderrTracer`] for `-V`/`-T`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    Off,
    /// High-level progress: modules and passes.
    Verbose,
    /// Everything, including per-call template instantiation.
    Trace,
}

pub trait Tracer {
    fn level(&self) -> TraceLevel;

    fn event(&mut self, level: TraceLevel, message: &str);
}

/// Discards every event.
#[derive(Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn level(&self) -> TraceLevel {
        TraceLevel::Off
    }

    fn event(&mut self, _level: TraceLevel, _message: &str) {}
}

/// Writes events at or below the configured level to stderr.
pub struct StderrTracer {
    level: TraceLevel,
}

impl StderrTracer {
    pub fn new(level: TraceLevel) -> Self {
        Self { level }
    }
}

impl Tracer for StderrTracer {
    fn level(&self) -> TraceLevel {
        self.level
    }

    fn event(&mut self, level: TraceLevel, message: &str) {
        if level <= self.level {
            eprintln!("[scribe] {message}");
        }
    }
}
