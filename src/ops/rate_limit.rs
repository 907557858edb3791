//! Fixed-window per-tool rate limiting.
//!
//! Each tool gets a counter that resets when its window expires. No
//! retry happens inside the engine; callers receive a structured
//! [`CommandError::RateLimited`].

use crate::error::{CommandError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default calls per window for read-style tools.
pub const DEFAULT_LIMIT: u32 = 30;

/// Calls per window for heavy tools (command execution, edits).
pub const HEAVY_LIMIT: u32 = 20;

/// Window length.
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct WindowState {
    started: Instant,
    count: u32,
}

/// Fixed-window counter per tool name.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    limits: HashMap<&'static str, u32>,
    windows: Mutex<HashMap<String, WindowState>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Creates a limiter with the standard per-tool limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(WINDOW)
    }

    /// Creates a limiter with a custom window (tests).
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        let mut limits: HashMap<&'static str, u32> = HashMap::new();
        for tool in ["run_command", "apply_edit", "run_snapshot"] {
            limits.insert(tool, HEAVY_LIMIT);
        }
        Self {
            window,
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Limit applied to a tool.
    #[must_use]
    pub fn limit_for(&self, tool: &str) -> u32 {
        self.limits.get(tool).copied().unwrap_or(DEFAULT_LIMIT)
    }

    /// Counts one call, failing when the window is full.
    pub fn check(&self, tool: &str) -> Result<()> {
        let limit = self.limit_for(tool);
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        let state = windows.entry(tool.to_string()).or_insert(WindowState {
            started: now,
            count: 0,
        });
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        if state.count >= limit {
            return Err(CommandError::RateLimited {
                tool: tool.to_string(),
                limit,
                window_secs: self.window.as_secs(),
            }
            .into());
        }
        state.count += 1;
        Ok(())
    }
}
