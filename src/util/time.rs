//! Time utilities for the simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_process_time() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Get process uptime in seconds
pub fn uptime_secs() -> u64 {
    PROCESS_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Frame rate defaults
pub const DEFAULT_SIMULATION_FPS: u32 = 60;
pub const DEFAULT_UPLOAD_FPS: u32 = 20;

/// Convert a frame rate into a whole-millisecond tick interval.
///
/// 60 fps becomes 16 ms, matching a browser `setInterval` cadence. Rates
/// above 1000 fps clamp to 1 ms so the interval never reaches zero.
pub fn fps_to_interval(fps: u32) -> Duration {
    let millis = (1000 / fps.max(1)).max(1);
    Duration::from_millis(millis as u64)
}

/// Measures the wall-clock delta between successive simulation ticks
#[derive(Debug, Clone)]
pub struct Timer {
    last: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous lap, then restart the timer
    pub fn lap(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;
        dt
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
