//! Ambient I/O interference estimate.
//!
//! Open and read timings are recorded into a small rolling window. The
//! average duration over the window is bucketed into an [`InterferenceLevel`],
//! which the storage layer uses to annotate retries and to produce advice for
//! the user. One monitor is created by the embedder and shared by reference
//! between every mount that should contribute to the same estimate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Samples kept in the rolling window.
pub const SAMPLE_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InterferenceLevel {
    None,
    /// Slight slowdowns.
    Low,
    /// Noticeable delays.
    Medium,
    /// Severe interference.
    High,
    /// System barely responsive.
    Critical,
}

impl InterferenceLevel {
    fn from_average_ms(avg_ms: u64) -> Self {
        match avg_ms {
            0..=99 => InterferenceLevel::None,
            100..=299 => InterferenceLevel::Low,
            300..=999 => InterferenceLevel::Medium,
            1000..=2999 => InterferenceLevel::High,
            _ => InterferenceLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InterferenceLevel::None => "none",
            InterferenceLevel::Low => "low",
            InterferenceLevel::Medium => "medium",
            InterferenceLevel::High => "high",
            InterferenceLevel::Critical => "critical",
        }
    }

    /// Recommended mitigation for this level.
    pub fn advice(&self) -> &'static str {
        match self {
            InterferenceLevel::None => "No interference detected",
            InterferenceLevel::Low => {
                "Minor interference - performance may be slightly affected"
            }
            InterferenceLevel::Medium => {
                "Moderate interference - try disabling Bluetooth/WiFi or moving phone away"
            }
            InterferenceLevel::High => {
                "High interference - move phone away from PC, disable wireless devices"
            }
            InterferenceLevel::Critical => {
                "Critical interference - check USB connections, wireless devices, and phone proximity"
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IoSample {
    duration: Duration,
    bytes: u64,
}

#[derive(Debug)]
struct MonitorState {
    samples: VecDeque<IoSample>,
    average: Duration,
    level: InterferenceLevel,
    interference_count: usize,
}

/// Thread-safe rolling estimate of ambient I/O interference.
#[derive(Debug)]
pub struct InterferenceMonitor {
    state: Mutex<MonitorState>,
}

impl Default for InterferenceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl InterferenceMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState {
                samples: VecDeque::with_capacity(SAMPLE_WINDOW),
                average: Duration::ZERO,
                level: InterferenceLevel::None,
                interference_count: 0,
            }),
        }
    }

    /// Record how long an I/O operation over `bytes` bytes took.
    pub fn record(&self, duration: Duration, bytes: u64) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.samples.push_back(IoSample {
            duration,
            bytes,
        });
        while state.samples.len() > SAMPLE_WINDOW {
            state.samples.pop_front();
        }

        let total: Duration = state.samples.iter().map(|s| s.duration).sum();
        state.average = total / state.samples.len() as u32;
        state.level = InterferenceLevel::from_average_ms(state.average.as_millis() as u64);
        if state.level >= InterferenceLevel::Medium {
            state.interference_count += 1;
        }
    }

    pub fn level(&self) -> InterferenceLevel {
        self.with_state(|s| s.level)
    }

    /// True once the estimate reaches [`InterferenceLevel::Medium`].
    pub fn is_active(&self) -> bool {
        self.level() >= InterferenceLevel::Medium
    }

    pub fn advice(&self) -> &'static str {
        self.level().advice()
    }

    /// Average duration over the current window.
    pub fn average_io_time(&self) -> Duration {
        self.with_state(|s| s.average)
    }

    /// Number of recorded samples that left the estimate at Medium or worse.
    pub fn interference_count(&self) -> usize {
        self.with_state(|s| s.interference_count)
    }

    /// Throughput over the current window in MiB/s, if any time was spent.
    pub fn throughput_mib_per_sec(&self) -> Option<f64> {
        self.with_state(|s| {
            let secs: f64 = s.samples.iter().map(|x| x.duration.as_secs_f64()).sum();
            let bytes: u64 = s.samples.iter().map(|x| x.bytes).sum();
            (secs > 0.0).then(|| bytes as f64 / 1_048_576.0 / secs)
        })
    }

    pub fn sample_count(&self) -> usize {
        self.with_state(|s| s.samples.len())
    }

    fn with_state<T>(&self, f: impl FnOnce(&MonitorState) -> T) -> T {
        match self.state.lock() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}
