//! Fixed-rate stepping driven by a variable-rate tick.

use log::warn;

use crate::ecs::status::{Error, Outcome};

/// The steady delta time used unless configured otherwise.
pub const DEFAULT_STEADY_DELTA: f32 = 1.0 / 30.0;

/// Accumulates presentation time and hands out the steady frames that became due.
///
/// Steady frame `n` covers the time `[n * steady_delta, (n + 1) * steady_delta)`. The first tick
/// always processes frame `0`.
#[derive(Debug, Clone)]
pub struct SteadyClock {
    steady_delta: f32,
    time: f64,
    steady_frame: i64,
    processed_steady_frame: i64,
    prev_time: Option<f64>,
}

/// What a single [`Mechanism::tick`](super::Mechanism::tick) did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Steady frames processed during the tick.
    pub steady_frames: u32,
    /// Position of the current time within the last processed steady frame, in `[0, 1]`.
    pub frame_ratio: f32,
    /// Progress from the previous tick time towards the next steady frame, in `[0, 1]`.
    pub future_factor: f32,
}

impl Default for SteadyClock {
    fn default() -> Self {
        Self::starting(DEFAULT_STEADY_DELTA)
    }
}

impl SteadyClock {
    /// Fails with [`Error::InvalidArgument`] unless `steady_delta` is positive and finite.
    pub fn new(steady_delta: f32) -> Outcome<Self> {
        if !(steady_delta.is_finite() && steady_delta > 0.0) {
            warn!("rejected steady delta {}", steady_delta);
            return Err(Error::InvalidArgument);
        }
        Ok(Self::starting(steady_delta))
    }

    const fn starting(steady_delta: f32) -> Self {
        Self {
            steady_delta,
            time: 0.0,
            steady_frame: 0,
            processed_steady_frame: -1,
            prev_time: None,
        }
    }

    #[inline]
    pub fn steady_delta(&self) -> f32 {
        self.steady_delta
    }

    /// Total presentation time.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The steady frame currently or last processed.
    #[inline]
    pub fn steady_frame(&self) -> i64 {
        self.steady_frame
    }

    /// The last completed steady frame, `-1` before the first one.
    #[inline]
    pub fn processed_steady_frame(&self) -> i64 {
        self.processed_steady_frame
    }

    pub fn steady_time(&self) -> f64 {
        self.steady_frame as f64 * self.steady_delta as f64
    }

    pub fn processed_steady_time(&self) -> Option<f64> {
        (self.processed_steady_frame >= 0)
            .then(|| self.processed_steady_frame as f64 * self.steady_delta as f64)
    }

    /// Begin the next steady frame due at `time`, if any.
    pub fn begin_steady_frame(&mut self, time: f64) -> Option<i64> {
        let needed = (time / self.steady_delta as f64) as i64;
        if self.processed_steady_frame >= needed {
            return None;
        }
        self.steady_frame = self.processed_steady_frame + 1;
        Some(self.steady_frame)
    }

    pub fn finish_steady_frame(&mut self) {
        self.processed_steady_frame = self.steady_frame;
    }

    pub fn steady_frame_ratio(&self, time: f64) -> f32 {
        let Some(processed) = self.processed_steady_time() else {
            return 0.0;
        };
        let delta = self.steady_delta as f64;
        ((time - processed) / delta).clamp(0.0, 1.0) as f32
    }

    pub fn steady_future_factor(&self, time: f64) -> f32 {
        let Some(prev) = self.prev_time else {
            return 0.0;
        };
        let future = (self.processed_steady_frame + 1) as f64 * self.steady_delta as f64;
        if time >= future {
            return 1.0;
        }
        if time <= prev {
            return 0.0;
        }
        ((time - prev) / (future - prev)) as f32
    }

    /// Close a tick that reached `time`.
    pub fn finish_tick(&mut self, time: f64) {
        self.time = time;
        self.prev_time = Some(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(clock: &mut SteadyClock, delta: f64) -> TickReport {
        let time = clock.time() + delta;
        let mut steady_frames = 0;
        while clock.begin_steady_frame(time).is_some() {
            clock.finish_steady_frame();
            steady_frames += 1;
        }
        let report = TickReport {
            steady_frames,
            frame_ratio: clock.steady_frame_ratio(time),
            future_factor: clock.steady_future_factor(time),
        };
        clock.finish_tick(time);
        report
    }

    #[test]
    fn first_tick_processes_frame_zero() {
        // Given
        let mut clock = SteadyClock::new(0.25).unwrap();

        // When
        let report = run(&mut clock, 0.0);

        // Then
        assert_eq!(report.steady_frames, 1);
        assert_eq!(clock.processed_steady_frame(), 0);
        assert_eq!(report.frame_ratio, 0.0);
        assert_eq!(report.future_factor, 0.0);
    }

    #[test]
    fn catches_up_on_due_frames() {
        // Given
        let mut clock = SteadyClock::new(0.25).unwrap();
        run(&mut clock, 0.0);

        // When
        let report = run(&mut clock, 0.625);

        // Then
        assert_eq!(report.steady_frames, 2);
        assert_eq!(clock.steady_frame(), 2);
        assert!((report.frame_ratio - 0.5).abs() < 1e-6);
        assert!((report.future_factor - 0.625 / 0.75).abs() < 1e-6);
    }

    #[test]
    fn short_ticks_do_not_step() {
        // Given
        let mut clock = SteadyClock::new(0.25).unwrap();
        run(&mut clock, 0.0);

        // When
        let report = run(&mut clock, 0.125);

        // Then
        assert_eq!(report.steady_frames, 0);
        assert!((report.frame_ratio - 0.5).abs() < 1e-6);
        assert_eq!(clock.processed_steady_time(), Some(0.0));
    }

    #[test]
    fn rejects_non_positive_steady_delta() {
        for steady_delta in [0.0, -0.5, f32::NAN, f32::INFINITY] {
            assert_eq!(SteadyClock::new(steady_delta).err(), Some(Error::InvalidArgument));
        }
    }

    #[test]
    fn default_steady_delta() {
        assert_eq!(SteadyClock::default().steady_delta(), DEFAULT_STEADY_DELTA);
        assert_eq!(SteadyClock::default().processed_steady_time(), None);
    }
}
