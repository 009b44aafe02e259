//! Looping playback of model animation clips on placed instances.
//!
//! Clips carry no keyframes here; a playback only tracks the time of each
//! clip so a backend can sample the model's own animation data.

use crate::{asset::AnimationClip, scene::NodeId};

/// Playback position of one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlayback {
    pub name: String,
    /// Clip length in seconds.
    pub duration: f64,
    /// Seconds into the clip, in `0..duration`.
    pub time: f64,
}

impl ClipPlayback {
    #[must_use]
    pub fn start(clip: &AnimationClip) -> Self {
        Self {
            name: clip.name.clone(),
            duration: clip.duration,
            time: 0.0,
        }
    }

    /// Move the clip forward by `dt` seconds, wrapping at its end. Clips of
    /// zero length stay at the start.
    pub fn advance(&mut self, dt: f64) {
        if self.duration > 0.0 && dt.is_finite() {
            self.time = (self.time + dt).rem_euclid(self.duration);
        }
    }
}

/// Every clip playing on one placement root.
#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    pub root: NodeId,
    pub clips: Vec<ClipPlayback>,
}

impl Playback {
    /// Start every clip of a model on `root`. `None` if the model has no
    /// clips.
    #[must_use]
    pub fn start(root: NodeId, clips: &[AnimationClip]) -> Option<Self> {
        (!clips.is_empty()).then(|| Self {
            root,
            clips: clips.iter().map(ClipPlayback::start).collect(),
        })
    }

    pub fn advance(&mut self, dt: f64) {
        for clip in &mut self.clips {
            clip.advance(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;

    fn clip(name: &str, duration: f64) -> AnimationClip {
        AnimationClip {
            name: name.to_string(),
            duration,
        }
    }

    #[test]
    fn test_clip_loops() {
        let mut playback = ClipPlayback::start(&clip("spin", 2.0));
        playback.advance(1.5);
        assert!((playback.time - 1.5).abs() < 1e-12);
        playback.advance(1.0);
        assert!((playback.time - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_length_clip_stays_put() {
        let mut playback = ClipPlayback::start(&clip("pose", 0.0));
        playback.advance(3.0);
        assert_eq!(playback.time, 0.0);
    }

    #[test]
    fn test_playback_needs_clips() {
        let root = Scene::default().root();
        assert!(Playback::start(root, &[]).is_none());

        let mut playback = Playback::start(root, &[clip("a", 1.0), clip("b", 4.0)]).unwrap();
        playback.advance(1.25);
        assert!((playback.clips[0].time - 0.25).abs() < 1e-12);
        assert!((playback.clips[1].time - 1.25).abs() < 1e-12);
    }
}
