//! Per-frame motion samples and the validated clip they form with a skeleton.

use glam::Vec3;

use crate::error::{AnimationError, AnimationResult};
use crate::skeleton::{JointId, Skeleton};

/// One joint's pose for one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSample {
    /// Translation; only the root's is used for placement.
    pub translation: Vec3,
    /// Euler angles in degrees about X, Y and Z. Applied Z, then X, then Y.
    pub rotation: Vec3,
}

impl MotionSample {
    pub fn new(translation: Vec3, rotation: Vec3) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// A sample with only a rotation.
    pub fn from_rotation(rotation: Vec3) -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation,
        }
    }
}

/// Frame-major table of samples: `frames[frame][joint]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionTable {
    frames: Vec<Vec<MotionSample>>,
    frame_duration: f32,
}

impl MotionTable {
    /// Build a motion table.
    ///
    /// # Errors
    /// Fails if there are no frames, the frame duration is not a positive
    /// finite number, frames differ in width, or any sample is not finite.
    pub fn new(frames: Vec<Vec<MotionSample>>, frame_duration: f32) -> AnimationResult<Self> {
        if frames.is_empty() {
            return Err(AnimationError::NoFrames);
        }
        if !(frame_duration.is_finite() && frame_duration > 0.0) {
            return Err(AnimationError::InvalidFrameDuration(frame_duration));
        }

        let expected = frames[0].len();
        for (frame, samples) in frames.iter().enumerate() {
            if samples.len() != expected {
                return Err(AnimationError::FrameWidthMismatch {
                    frame,
                    expected,
                    found: samples.len(),
                });
            }
            if let Some(joint) = samples
                .iter()
                .position(|s| !(s.translation.is_finite() && s.rotation.is_finite()))
            {
                return Err(AnimationError::NonFiniteSample { frame, joint });
            }
        }

        Ok(Self {
            frames,
            frame_duration,
        })
    }

    /// Fail unless the table carries exactly one sample per skeleton joint.
    pub fn validate_against(&self, skeleton: &Skeleton) -> AnimationResult<()> {
        if self.joint_count() != skeleton.len() {
            return Err(AnimationError::JointCountMismatch {
                skeleton: skeleton.len(),
                motion: self.joint_count(),
            });
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn joint_count(&self) -> usize {
        self.frames[0].len()
    }

    /// Seconds per captured frame.
    pub fn frame_duration(&self) -> f32 {
        self.frame_duration
    }

    /// Capture rate in frames per second.
    pub fn capture_rate(&self) -> f32 {
        1.0 / self.frame_duration
    }

    /// `frame_duration × frame_count`.
    pub fn loop_duration(&self) -> f32 {
        self.frame_duration * self.frames.len() as f32
    }

    /// All samples of one frame, indexed by joint id.
    pub fn frame(&self, index: usize) -> Option<&[MotionSample]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    pub fn sample(&self, frame: usize, joint: JointId) -> Option<&MotionSample> {
        self.frames.get(frame)?.get(joint.index())
    }
}

/// A skeleton paired with a motion table that covers exactly its joints.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    skeleton: Skeleton,
    motion: MotionTable,
}

impl AnimationClip {
    pub fn new(skeleton: Skeleton, motion: MotionTable) -> AnimationResult<Self> {
        motion.validate_against(&skeleton)?;
        tracing::info!(
            "Animation clip ready: {} joints, {} frames at {:.2} fps ({:.2}s loop)",
            skeleton.len(),
            motion.frame_count(),
            motion.capture_rate(),
            motion.loop_duration()
        );
        Ok(Self { skeleton, motion })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn motion(&self) -> &MotionTable {
        &self.motion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;

    fn two_joint_skeleton() -> Skeleton {
        Skeleton::new(vec![
            Joint::new(0, "root", Vec3::ZERO, vec![], false),
            Joint::new(1, "tip", Vec3::Y, vec![JointId::ROOT], true),
        ])
        .unwrap()
    }

    #[test]
    fn test_durations() {
        let table = MotionTable::new(vec![vec![MotionSample::default(); 2]; 4], 0.25).unwrap();
        assert_eq!(table.frame_count(), 4);
        assert_eq!(table.joint_count(), 2);
        assert_eq!(table.loop_duration(), 1.0);
        assert_eq!(table.capture_rate(), 4.0);
    }

    #[test]
    fn test_rejects_no_frames() {
        assert_eq!(MotionTable::new(vec![], 0.1), Err(AnimationError::NoFrames));
    }

    #[test]
    fn test_rejects_bad_duration() {
        let frames = vec![vec![MotionSample::default()]];
        assert!(MotionTable::new(frames.clone(), 0.0).is_err());
        assert!(MotionTable::new(frames.clone(), -1.0).is_err());
        assert!(MotionTable::new(frames, f32::NAN).is_err());
    }

    #[test]
    fn test_rejects_ragged_frames() {
        let frames = vec![
            vec![MotionSample::default(); 2],
            vec![MotionSample::default(); 1],
        ];
        assert_eq!(
            MotionTable::new(frames, 0.1),
            Err(AnimationError::FrameWidthMismatch {
                frame: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_rejects_nan_sample() {
        let mut frames = vec![vec![MotionSample::default(); 2]; 2];
        frames[1][1].rotation.y = f32::NAN;
        assert_eq!(
            MotionTable::new(frames, 0.1),
            Err(AnimationError::NonFiniteSample { frame: 1, joint: 1 })
        );
    }

    #[test]
    fn test_clip_requires_matching_joint_set() {
        let table = MotionTable::new(vec![vec![MotionSample::default(); 3]], 0.1).unwrap();
        assert_eq!(
            AnimationClip::new(two_joint_skeleton(), table),
            Err(AnimationError::JointCountMismatch {
                skeleton: 2,
                motion: 3
            })
        );
    }

    #[test]
    fn test_sample_lookup() {
        let mut frames = vec![vec![MotionSample::default(); 2]; 2];
        frames[1][0] = MotionSample::new(Vec3::new(1.0, 2.0, 3.0), Vec3::Z * 90.0);
        let table = MotionTable::new(frames, 0.1).unwrap();
        let clip = AnimationClip::new(two_joint_skeleton(), table).unwrap();

        let sample = clip.motion().sample(1, JointId::ROOT).unwrap();
        assert_eq!(sample.translation, Vec3::new(1.0, 2.0, 3.0));
        assert!(clip.motion().sample(2, JointId::ROOT).is_none());
        assert!(clip.motion().sample(0, JointId(5)).is_none());
    }
}
