use zhost_core::log::{LogInfo, Loglevel};

/// The interface every subsystem logger ultimately writes through. The
/// sink itself — where formatted output ends up, a terminal, a file, a
/// channel to the embedding application — is deliberately out of scope
/// here (§1): the driver only emits structured events.
pub trait LocalImmutableLogger: Send + Sync {
    fn log(&self, log: LogInfo, level: Loglevel);
    fn log_level(&self) -> Loglevel;
}

/// A sink that discards everything below its configured level. Useful as
/// a default when the embedding application hasn't wired up a real one
/// yet, and in tests that only care about the structured payload
/// produced up to the point of logging, not where it ends up.
pub struct NullLogger {
    level: Loglevel,
}

impl NullLogger {
    pub fn new(level: Loglevel) -> Self {
        Self { level }
    }
}

impl Default for NullLogger {
    fn default() -> Self {
        Self::new(Loglevel::Info)
    }
}

impl LocalImmutableLogger for NullLogger {
    fn log(&self, _log: LogInfo, _level: Loglevel) {}

    fn log_level(&self) -> Loglevel {
        self.level
    }
}
