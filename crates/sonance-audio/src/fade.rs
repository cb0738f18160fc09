use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeKind {
    In,
    Out,
}

/// A linear gain envelope. Levels are multipliers on the voice's target
/// gain, so a channel volume change mid-fade is picked up on the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    kind: FadeKind,
    from: f32,
    to: f32,
    duration: Duration,
    elapsed: Duration,
}

impl Fade {
    /// Ramp from silence to full level.
    pub fn fade_in(duration: Duration) -> Self {
        Self::new(FadeKind::In, 0.0, 1.0, duration)
    }

    /// Ramp from `level` down to silence.
    pub fn fade_out(level: f32, duration: Duration) -> Self {
        Self::new(FadeKind::Out, level, 0.0, duration)
    }

    fn new(kind: FadeKind, from: f32, to: f32, duration: Duration) -> Self {
        Self {
            kind,
            from: from.clamp(0.0, 1.0),
            to,
            duration,
            elapsed: Duration::ZERO,
        }
    }

    pub fn kind(&self) -> FadeKind {
        self.kind
    }

    /// Move the envelope forward and return the new level.
    pub fn advance(&mut self, dt: Duration) -> f32 {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.level()
    }

    pub fn level(&self) -> f32 {
        if self.duration.is_zero() {
            return self.to;
        }
        let t = (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * t
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }
}
