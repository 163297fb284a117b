/// Progress reporting for long-running builds and diffs.
///
/// The index builder and diff engine call the callback at throttled intervals with a
/// best-effort fraction in `[0.0, 1.0]`. Progress is advisory; it is not monotonic across
/// phases.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, phase: &str, percent: f32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _phase: &str, _percent: f32) {}
}

const PROGRESS_MIN_DELTA: f32 = 0.01;

/// Clamps and de-duplicates progress events before they reach the callback.
pub(crate) struct ProgressThrottle<'a> {
    callback: Option<&'a dyn ProgressCallback>,
    last_phase: Option<&'static str>,
    last_percent: Option<f32>,
}

impl<'a> ProgressThrottle<'a> {
    pub(crate) fn new(callback: Option<&'a dyn ProgressCallback>) -> Self {
        Self {
            callback,
            last_phase: None,
            last_percent: None,
        }
    }

    /// Report `done` of `total` units for `phase`.
    pub(crate) fn step(&mut self, phase: &'static str, done: usize, total: usize) {
        let percent = if total == 0 {
            1.0
        } else {
            done as f32 / total as f32
        };
        self.report(phase, percent);
    }

    pub(crate) fn report(&mut self, phase: &'static str, percent: f32) {
        let Some(callback) = self.callback else {
            return;
        };

        let clamped = if percent.is_finite() {
            percent.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let should_emit = match (self.last_phase, self.last_percent) {
            (Some(last_phase), Some(last_percent)) if last_phase == phase => {
                clamped == 0.0
                    || clamped == 1.0
                    || clamped < last_percent
                    || (clamped - last_percent) >= PROGRESS_MIN_DELTA
            }
            _ => true,
        };
        if !should_emit {
            return;
        }

        self.last_phase = Some(phase);
        self.last_percent = Some(clamped);
        callback.on_progress(phase, clamped);
    }
}
