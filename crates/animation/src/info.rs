//! Human-readable dumps of a clip's hierarchy and motion data.

use std::fmt;

use crate::motion::{AnimationClip, MotionTable};
use crate::skeleton::Skeleton;

/// Indented tree of joints with offsets and leaf markers.
pub struct SkeletonInfo<'a>(pub &'a Skeleton);

impl fmt::Display for SkeletonInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for joint in self.0.joints() {
            let o = joint.rest_offset;
            write!(
                f,
                "{:indent$}{}: {} ({:.3}, {:.3}, {:.3})",
                "",
                joint.id,
                joint.name,
                o.x,
                o.y,
                o.z,
                indent = joint.depth() * 2
            )?;
            if joint.is_leaf {
                f.write_str(" [leaf]")?;
            }
            writeln!(f)?;
        }
        write!(f, "Number of joints: {}", self.0.len())
    }
}

/// Motion summary; with `{:#}` every frame's samples are listed too.
pub struct MotionInfo<'a>(pub &'a MotionTable);

impl fmt::Display for MotionInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.0;
        write!(
            f,
            "Frames: {}, frame time: {:.6}s ({:.2} fps), loop: {:.3}s",
            table.frame_count(),
            table.frame_duration(),
            table.capture_rate(),
            table.loop_duration()
        )?;
        if !f.alternate() {
            return Ok(());
        }
        for index in 0..table.frame_count() {
            write!(f, "\nframe {index}:")?;
            for sample in table.frame(index).unwrap_or_default() {
                let (t, r) = (sample.translation, sample.rotation);
                write!(
                    f,
                    " (({}, {}, {}), ({}, {}, {}))",
                    t.x, t.y, t.z, r.x, r.y, r.z
                )?;
            }
        }
        Ok(())
    }
}

impl AnimationClip {
    /// Hierarchy dump, see [`SkeletonInfo`].
    pub fn skeleton_info(&self) -> SkeletonInfo<'_> {
        SkeletonInfo(self.skeleton())
    }

    /// Motion dump, see [`MotionInfo`].
    pub fn motion_info(&self) -> MotionInfo<'_> {
        MotionInfo(self.motion())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::motion::MotionSample;
    use crate::skeleton::{Joint, JointId};

    fn clip() -> AnimationClip {
        let skeleton = Skeleton::new(vec![
            Joint::new(0, "Hips", Vec3::ZERO, vec![], false),
            Joint::new(1, "Head", Vec3::new(0.0, 1.5, 0.0), vec![JointId::ROOT], true),
        ])
        .unwrap();
        let table = MotionTable::new(vec![vec![MotionSample::default(); 2]; 3], 0.5).unwrap();
        AnimationClip::new(skeleton, table).unwrap()
    }

    #[test]
    fn test_skeleton_dump_indents_children() {
        let text = clip().skeleton_info().to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "0: Hips (0.000, 0.000, 0.000)");
        assert_eq!(lines[1], "  1: Head (0.000, 1.500, 0.000) [leaf]");
        assert_eq!(lines[2], "Number of joints: 2");
    }

    #[test]
    fn test_motion_summary_and_detail() {
        let clip = clip();
        let summary = clip.motion_info().to_string();
        assert!(summary.starts_with("Frames: 3"));
        assert!(!summary.contains("frame 0:"));

        let detail = format!("{:#}", clip.motion_info());
        assert_eq!(detail.matches("\nframe ").count(), 3);
    }
}
