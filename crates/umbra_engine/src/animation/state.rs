//! Animation playback state

/// Playback cursor for one active clip
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    /// Name of the active clip
    pub clip: String,
    /// Current time in seconds
    pub time: f32,
    /// Playback rate multiplier
    pub speed: f32,
    /// Set by [`AnimationState::play`], cleared when a one-shot clip ends
    pub playing: bool,
    /// Pause flag; a paused state keeps its time
    pub paused: bool,
    /// Wrap around at the end of the clip
    pub looping: bool,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self {
            clip: String::new(),
            time: 0.0,
            speed: 1.0,
            playing: false,
            paused: false,
            looping: true,
        }
    }
}

impl AnimationState {
    /// Start `clip` from the beginning
    pub fn play(&mut self, clip: impl Into<String>, looping: bool) {
        self.clip = clip.into();
        self.time = 0.0;
        self.playing = true;
        self.paused = false;
        self.looping = looping;
    }

    /// Stop and rewind
    pub fn stop(&mut self) {
        self.playing = false;
        self.paused = false;
        self.time = 0.0;
    }

    /// Pause without losing the current time
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume after [`AnimationState::pause`]
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// True while playing and not paused
    pub fn is_advancing(&self) -> bool {
        self.playing && !self.paused
    }

    /// Advance by one step of `delta_time` seconds for a clip of `duration`.
    ///
    /// Returns `true` if the time changed.
    pub fn step(&mut self, delta_time: f32, duration: f32) -> bool {
        if !self.is_advancing() || !delta_time.is_finite() {
            return false;
        }
        if duration <= 0.0 {
            self.time = 0.0;
            if !self.looping {
                self.playing = false;
            }
            return false;
        }

        let previous = self.time;
        let time = self.time + delta_time * self.speed;
        if self.looping {
            self.time = time.rem_euclid(duration);
        } else {
            self.time = time.clamp(0.0, duration);
            if time >= duration || (time <= 0.0 && self.speed < 0.0) {
                self.playing = false;
            }
        }
        (self.time - previous).abs() > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_looping_wraps() {
        let mut state = AnimationState::default();
        state.play("walk", true);
        for _ in 0..5 {
            state.step(0.25, 1.0);
        }
        assert_relative_eq!(state.time, 0.25, epsilon = 1e-5);
        assert!(state.playing);
    }

    #[test]
    fn test_one_shot_stops_at_end() {
        let mut state = AnimationState::default();
        state.play("wave", false);
        state.step(0.6, 1.0);
        state.step(0.6, 1.0);
        assert_relative_eq!(state.time, 1.0);
        assert!(!state.playing);
        assert!(!state.step(0.1, 1.0));
    }

    #[test]
    fn test_pause_and_resume() {
        let mut state = AnimationState::default();
        state.play("idle", true);
        state.step(0.1, 2.0);
        state.pause();
        assert!(!state.step(0.5, 2.0));
        assert_relative_eq!(state.time, 0.1);
        state.resume();
        assert!(state.step(0.5, 2.0));
        assert_relative_eq!(state.time, 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_not_playing_does_not_advance() {
        let mut state = AnimationState::default();
        assert!(!state.step(1.0, 1.0));
        assert_eq!(state.time, 0.0);
    }
}
