//! Performance measurement tools.

use std::{
    fmt,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Smoothing factor of the exponential moving average kept by [`Timer`].
const EMA_ALPHA: f32 = 0.3;

/// A timer that measures how long an operation takes, and averages the measurements.
///
/// Collected timings are reset whenever the timer is displayed using `{}`
/// ([`std::fmt::Display`]), so that every log line describes the period since the previous one.
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Exponential moving average of the measured durations, in seconds.
    avg: Option<f32>,
    /// Number of measurements since the last reset.
    count: usize,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// The time between the call to `start` and the drop of the returned [`TimerGuard`] is
    /// recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, duration: Duration) {
        let secs = duration.as_secs_f32();
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        state.avg = Some(match state.avg {
            Some(avg) => avg + EMA_ALPHA * (secs - avg),
            None => secs,
        });
        state.count += 1;
    }

    /// Returns the number of recorded measurements and their average duration, then resets both.
    pub fn take(&self) -> (usize, Duration) {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        let State { avg, count } = std::mem::take(&mut *state);
        (count, Duration::from_secs_f32(avg.unwrap_or(0.0)))
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (count, avg) = self.take();
        let avg_ms = avg.as_secs_f32() * 1000.0;
        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Logs frames per second, together with the stage timings of the pipeline.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
    interval: Duration,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
            interval: Duration::from_secs(1),
        }
    }

    /// Sets how often a log line is written. Defaults to once per second.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    pub fn tick(&mut self) {
        self.tick_with(std::iter::empty::<&Timer>());
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    ///
    /// `extra` is only formatted when a log line is actually written, so passing [`Timer`]s here
    /// resets them once per interval.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        self.frames += 1;
        if self.start.elapsed() > self.interval {
            let extra = extra
                .into_iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>();
            if extra.is_empty() {
                log::debug!("{}: {} FPS", self.name, self.frames);
            } else {
                log::debug!("{}: {} FPS ({})", self.name, self.frames, extra.join(", "));
            }

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}
