use std::fmt;

/// One decision taken while handling a request. The ordered list of these is
/// the request's trace; tests and operators assert on membership and order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Receive,
    Pass,
    Invalidate,
    Lookup,
    Reload,
    Fresh,
    Stale,
    Miss,
    Fetch,
    Valid,
    Invalid,
    ConnectionFailed,
    Retrying { attempt: u32, limit: u32 },
    Ignore,
    Store,
    Deliver,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Receive => f.write_str("receive"),
            TraceEvent::Pass => f.write_str("pass"),
            TraceEvent::Invalidate => f.write_str("invalidate"),
            TraceEvent::Lookup => f.write_str("lookup"),
            TraceEvent::Reload => f.write_str("reload"),
            TraceEvent::Fresh => f.write_str("fresh"),
            TraceEvent::Stale => f.write_str("stale"),
            TraceEvent::Miss => f.write_str("miss"),
            TraceEvent::Fetch => f.write_str("fetch"),
            TraceEvent::Valid => f.write_str("valid"),
            TraceEvent::Invalid => f.write_str("invalid"),
            TraceEvent::ConnectionFailed => f.write_str("connection-failed"),
            TraceEvent::Retrying { attempt, limit } => {
                write!(f, "retrying ({attempt}/{limit})")
            }
            TraceEvent::Ignore => f.write_str("ignore"),
            TraceEvent::Store => f.write_str("store"),
            TraceEvent::Deliver => f.write_str("deliver"),
        }
    }
}

/// The ordered decision history of one handled request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn contains(&self, event: TraceEvent) -> bool {
        self.events.contains(&event)
    }

    /// Whether any retry attempt was recorded, regardless of its numbering.
    pub fn retried(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, TraceEvent::Retrying { .. }))
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, event) in self.events.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{event}")?;
        }
        Ok(())
    }
}
