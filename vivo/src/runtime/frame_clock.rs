use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Fixed-rate pacing for the host loop. The interpreter keeps its own
/// frame count; this only decides when a frame is due.
#[derive(Debug)]
pub struct FrameClock {
    fps: f32,
    last_tick: Instant,
    accumulator: Duration,
    frame_intervals: VecDeque<Duration>,
    max_intervals: usize,
}

impl FrameClock {
    pub fn new(fps: f32) -> Self {
        Self::with_start(fps, Instant::now())
    }

    pub fn with_start(fps: f32, now: Instant) -> Self {
        Self {
            fps: fps.max(1.0),
            last_tick: now,
            accumulator: Duration::ZERO,
            frame_intervals: VecDeque::new(),
            max_intervals: 90,
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.fps)
    }

    pub fn next_deadline(&self) -> Instant {
        let remaining = self
            .frame_duration()
            .checked_sub(self.accumulator)
            .unwrap_or_default();
        self.last_tick + remaining
    }

    pub fn average_fps(&self) -> f32 {
        if self.frame_intervals.is_empty() {
            return 0.0;
        }

        let sum: Duration = self.frame_intervals.iter().copied().sum();
        let avg = sum / self.frame_intervals.len() as u32;

        if avg.is_zero() {
            return 0.0;
        }

        1.0 / avg.as_secs_f32()
    }

    /// Returns true when at least one frame interval has elapsed. Missed
    /// frames are dropped rather than replayed, since every frame runs
    /// user code.
    pub fn tick(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.accumulator += elapsed;

        let frame_duration = self.frame_duration();
        if self.accumulator < frame_duration {
            return false;
        }

        self.accumulator = Duration::from_nanos(
            (self.accumulator.as_nanos() % frame_duration.as_nanos()) as u64,
        );
        self.record_interval(elapsed);
        true
    }

    fn record_interval(&mut self, interval: Duration) {
        self.frame_intervals.push_back(interval);
        if self.frame_intervals.len() > self.max_intervals {
            self.frame_intervals.pop_front();
        }
    }
}
