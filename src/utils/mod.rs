use std::time::Instant;
use tracing::{info, warn};

/// Wall-clock guard for one subcommand.
///
/// The command records its outcome with [`CommandTimer::done`]; the summary
/// line is logged together with the elapsed time when the guard drops. A guard
/// dropped without an outcome means the command bailed out with an error.
pub struct CommandTimer {
    command: &'static str,
    started: Instant,
    outcome: Option<String>,
}

impl CommandTimer {
    pub fn start(command: &'static str) -> Self {
        info!("▶ {}", command);
        Self {
            command,
            started: Instant::now(),
            outcome: None,
        }
    }

    pub fn done(&mut self, outcome: impl Into<String>) {
        self.outcome = Some(outcome.into());
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let took = self.started.elapsed();
        match &self.outcome {
            Some(outcome) => info!("✔ {}: {} ({:.2?})", self.command, outcome, took),
            None => warn!("✘ {} aborted after {:.2?}", self.command, took),
        }
    }
}

/// Digits grouped by thousands, for row counts and byte sizes in log lines.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
