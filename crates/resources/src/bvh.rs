//! BVH (Biovision Hierarchy) motion loader.
//!
//! Produces a validated [`AnimationClip`]. `End Site` blocks become leaf
//! joints without channels, so every joint of the clip has a sample in every
//! frame (zero for end sites).
//!
//! Rotation channels are matched by axis name, so `Zrotation Xrotation
//! Yrotation` and `Xrotation Yrotation Zrotation` both fill the same Euler
//! fields; the evaluator always applies them Z, then X, then Y.

use std::path::Path;

use glam::Vec3;
use mocap_animation::{
    AnimationClip, AnimationError, Joint, JointId, MAX_JOINTS, MotionSample, MotionTable, Skeleton,
};

use crate::error::{ResourceError, ResourceResult};

/// Three position and three rotation channels.
const MAX_CHANNELS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    XPosition,
    YPosition,
    ZPosition,
    XRotation,
    YRotation,
    ZRotation,
}

impl Channel {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "xposition" => Some(Self::XPosition),
            "yposition" => Some(Self::YPosition),
            "zposition" => Some(Self::ZPosition),
            "xrotation" => Some(Self::XRotation),
            "yrotation" => Some(Self::YRotation),
            "zrotation" => Some(Self::ZRotation),
            _ => None,
        }
    }

    fn apply(self, sample: &mut MotionSample, value: f32) {
        match self {
            Self::XPosition => sample.translation.x = value,
            Self::YPosition => sample.translation.y = value,
            Self::ZPosition => sample.translation.z = value,
            Self::XRotation => sample.rotation.x = value,
            Self::YRotation => sample.rotation.y = value,
            Self::ZRotation => sample.rotation.z = value,
        }
    }
}

struct JointRecord {
    name: String,
    offset: Vec3,
    channels: Vec<Channel>,
    parents: Vec<JointId>,
    children: usize,
}

struct Parser<'a> {
    tokens: Vec<(usize, &'a str)>,
    pos: usize,
    joints: Vec<JointRecord>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        let tokens = source
            .lines()
            .enumerate()
            .flat_map(|(i, line)| line.split_whitespace().map(move |t| (i + 1, t)))
            .collect();
        Self {
            tokens,
            pos: 0,
            joints: Vec::new(),
        }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |&(line, _)| line)
    }

    fn error<T>(&self, message: impl Into<String>) -> ResourceResult<T> {
        Err(ResourceError::BvhSyntax {
            line: self.line(),
            message: message.into(),
        })
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|&(_, t)| t)
    }

    fn next(&mut self) -> ResourceResult<&'a str> {
        match self.peek() {
            Some(token) => {
                self.pos += 1;
                Ok(token)
            }
            None => self.error("unexpected end of file"),
        }
    }

    fn expect(&mut self, keyword: &str) -> ResourceResult<()> {
        let token = self.next()?;
        if token.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            self.pos -= 1;
            self.error(format!("expected '{keyword}', found '{token}'"))
        }
    }

    fn number<T: std::str::FromStr>(&mut self, what: &str) -> ResourceResult<T> {
        let token = self.next()?;
        token.parse().or_else(|_| {
            self.pos -= 1;
            self.error(format!("expected {what}, found '{token}'"))
        })
    }

    fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.pos)
    }

    /// Fails once the hierarchy would exceed [`MAX_JOINTS`], which also
    /// bounds the nesting depth of [`Self::joint`].
    fn reserve_joint(&self) -> ResourceResult<()> {
        if self.joints.len() >= MAX_JOINTS {
            return Err(AnimationError::TooManyJoints {
                count: self.joints.len() + 1,
                max: MAX_JOINTS,
            }
            .into());
        }
        Ok(())
    }

    fn vec3(&mut self) -> ResourceResult<Vec3> {
        Ok(Vec3::new(
            self.number("a number")?,
            self.number("a number")?,
            self.number("a number")?,
        ))
    }

    fn hierarchy(&mut self) -> ResourceResult<()> {
        self.expect("HIERARCHY")?;
        self.expect("ROOT")?;
        self.joint(Vec::new())?;
        if self.peek().is_some_and(|t| t.eq_ignore_ascii_case("ROOT")) {
            return self.error("multiple ROOT joints are not supported");
        }
        Ok(())
    }

    fn joint(&mut self, parents: Vec<JointId>) -> ResourceResult<()> {
        self.reserve_joint()?;
        let name = self.next()?.to_string();
        self.expect("{")?;
        self.expect("OFFSET")?;
        let offset = self.vec3()?;

        self.expect("CHANNELS")?;
        let count: usize = self.number("a channel count")?;
        if count > MAX_CHANNELS {
            self.pos -= 1;
            return self.error(format!("channel count {count} exceeds {MAX_CHANNELS}"));
        }
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            let token = self.next()?;
            match Channel::parse(token) {
                Some(channel) => channels.push(channel),
                None => {
                    self.pos -= 1;
                    return self.error(format!("unknown channel '{token}'"));
                }
            }
        }

        let id = JointId(self.joints.len());
        if let Some(&parent) = parents.last() {
            self.joints[parent.index()].children += 1;
        }
        self.joints.push(JointRecord {
            name: name.clone(),
            offset,
            channels,
            parents: parents.clone(),
            children: 0,
        });

        let mut chain = parents;
        chain.push(id);

        loop {
            match self.next()? {
                "}" => return Ok(()),
                t if t.eq_ignore_ascii_case("JOINT") => self.joint(chain.clone())?,
                t if t.eq_ignore_ascii_case("End") => {
                    self.expect("Site")?;
                    self.end_site(&name, chain.clone())?;
                }
                other => {
                    self.pos -= 1;
                    return self.error(format!("unexpected '{other}' in joint '{name}'"));
                }
            }
        }
    }

    fn end_site(&mut self, parent_name: &str, parents: Vec<JointId>) -> ResourceResult<()> {
        self.expect("{")?;
        self.expect("OFFSET")?;
        let offset = self.vec3()?;
        self.expect("}")?;

        self.reserve_joint()?;
        if let Some(&parent) = parents.last() {
            self.joints[parent.index()].children += 1;
        }
        self.joints.push(JointRecord {
            name: format!("{parent_name}_End"),
            offset,
            channels: Vec::new(),
            parents,
            children: 0,
        });
        Ok(())
    }

    fn motion(&mut self) -> ResourceResult<(Vec<Vec<MotionSample>>, f32)> {
        self.expect("MOTION")?;
        self.expect("Frames:")?;
        let frame_count: usize = self.number("a frame count")?;
        self.expect("Frame")?;
        self.expect("Time:")?;
        let frame_time: f32 = self.number("a frame time")?;

        let values_per_frame: usize = self.joints.iter().map(|j| j.channels.len()).sum();
        if values_per_frame == 0 && frame_count > 0 {
            return self.error("hierarchy declares no channels to animate");
        }
        // The declared count is untrusted; every frame needs its values present.
        let capacity = frame_count.min(self.remaining() / values_per_frame.max(1));
        let mut frames = Vec::with_capacity(capacity);
        for frame in 0..frame_count {
            let mut samples = vec![MotionSample::default(); self.joints.len()];
            for (joint, sample) in self.joints.iter().zip(samples.iter_mut()) {
                for &channel in &joint.channels {
                    let token = self.tokens.get(self.pos).map(|&(_, t)| t);
                    let value = match token.map(str::parse::<f32>) {
                        Some(Ok(value)) => value,
                        Some(Err(_)) => {
                            return self.error(format!(
                                "frame {frame}: expected a channel value, found '{}'",
                                token.unwrap_or_default()
                            ));
                        }
                        None => {
                            return self.error(format!(
                                "file ends inside frame {frame} of {frame_count}"
                            ));
                        }
                    };
                    self.pos += 1;
                    channel.apply(sample, value);
                }
            }
            frames.push(samples);
        }

        if let Some(extra) = self.peek() {
            return self.error(format!("unexpected '{extra}' after the last frame"));
        }

        Ok((frames, frame_time))
    }
}

/// Parse BVH text into a validated clip.
///
/// # Errors
/// [`ResourceError::BvhSyntax`] for malformed text (with the offending
/// line), [`ResourceError::InvalidClip`] if the hierarchy or motion fails
/// validation (too many joints, zero frames, bad frame time).
pub fn parse(source: &str) -> ResourceResult<AnimationClip> {
    let mut parser = Parser::new(source);
    parser.hierarchy()?;
    let (frames, frame_time) = parser.motion()?;

    let joints = parser
        .joints
        .into_iter()
        .enumerate()
        .map(|(id, record)| {
            Joint::new(
                id,
                record.name,
                record.offset,
                record.parents,
                record.children == 0,
            )
        })
        .collect();

    let skeleton = Skeleton::new(joints)?;
    let motion = MotionTable::new(frames, frame_time)?;
    Ok(AnimationClip::new(skeleton, motion)?)
}

/// Read and parse a BVH file.
pub fn load(path: &Path) -> ResourceResult<AnimationClip> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }
    let source = std::fs::read_to_string(path)?;
    tracing::info!("Loading motion from {}", path.display());
    parse(&source)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "\
HIERARCHY
ROOT Hips
{
  OFFSET 0.0 0.0 0.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT Chest
  {
    OFFSET 0.0 5.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0.0 3.0 0.0
    }
  }
  JOINT Leg
  {
    OFFSET 2.0 -1.0 0.0
    CHANNELS 3 Xrotation Yrotation Zrotation
    End Site
    {
      OFFSET 0.0 -6.0 0.0
    }
  }
}
MOTION
Frames: 2
Frame Time: 0.0333333
1 90 2 10 20 30 0 0 45 1 2 3
1.5 91 2 0 0 0 0 0 0 0 0 0
";

    #[test]
    fn test_parse_hierarchy() {
        let clip = parse(SIMPLE).unwrap();
        let skeleton = clip.skeleton();
        let names: Vec<_> = skeleton.joints().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["Hips", "Chest", "Chest_End", "Leg", "Leg_End"]);

        let chest_end = skeleton.find("Chest_End").unwrap();
        assert_eq!(chest_end.parents, vec![JointId(0), JointId(1)]);
        assert!(chest_end.is_leaf);
        assert_eq!(chest_end.rest_offset, Vec3::new(0.0, 3.0, 0.0));
        assert!(!skeleton.find("Leg").unwrap().is_leaf);
    }

    #[test]
    fn test_parse_motion_channels_by_name() {
        let clip = parse(SIMPLE).unwrap();
        let motion = clip.motion();
        assert_eq!(motion.frame_count(), 2);
        assert!((motion.frame_duration() - 0.0333333).abs() < 1e-7);

        let hips = motion.sample(0, JointId(0)).unwrap();
        assert_eq!(hips.translation, Vec3::new(1.0, 90.0, 2.0));
        assert_eq!(hips.rotation, Vec3::new(20.0, 30.0, 10.0));

        let chest = motion.sample(0, JointId(1)).unwrap();
        assert_eq!(chest.rotation, Vec3::new(0.0, 45.0, 0.0));

        let leg = motion.sample(0, JointId(3)).unwrap();
        assert_eq!(leg.rotation, Vec3::new(1.0, 2.0, 3.0));

        let end = motion.sample(1, JointId(2)).unwrap();
        assert_eq!(*end, MotionSample::default());
    }

    #[test]
    fn test_truncated_motion_reports_line() {
        let source = SIMPLE.replace("1.5 91 2 0 0 0 0 0 0 0 0 0\n", "1.5 91 2\n");
        match parse(&source) {
            Err(ResourceError::BvhSyntax { line, message }) => {
                assert_eq!(line, 29);
                assert!(message.contains("frame 1"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_channel() {
        let source = SIMPLE.replace("CHANNELS 3 Zrotation", "CHANNELS 3 Wrotation");
        match parse(&source) {
            Err(ResourceError::BvhSyntax { line, message }) => {
                assert_eq!(line, 9);
                assert!(message.contains("Wrotation"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_trailing_values_rejected() {
        let source = format!("{SIMPLE}7 7 7\n");
        assert!(matches!(parse(&source), Err(ResourceError::BvhSyntax { .. })));
    }

    #[test]
    fn test_zero_frames_is_invalid_clip() {
        let source = SIMPLE
            .replace("Frames: 2", "Frames: 0")
            .replace("1 90 2 10 20 30 0 0 45 1 2 3\n", "")
            .replace("1.5 91 2 0 0 0 0 0 0 0 0 0\n", "");
        assert!(matches!(parse(&source), Err(ResourceError::InvalidClip(_))));
    }

    #[test]
    fn test_oversized_channel_count() {
        let source = SIMPLE.replace(
            "CHANNELS 3 Zrotation",
            "CHANNELS 1000000000000000000 Zrotation",
        );
        match parse(&source) {
            Err(ResourceError::BvhSyntax { line, message }) => {
                assert_eq!(line, 9);
                assert!(message.contains("exceeds 6"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_oversized_frame_count() {
        let source = SIMPLE.replace("Frames: 2", "Frames: 1000000000000000000");
        match parse(&source) {
            Err(ResourceError::BvhSyntax { message, .. }) => {
                assert!(message.contains("file ends inside frame 2"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_motion_without_channels() {
        let source = "\
HIERARCHY
ROOT Hips
{
  OFFSET 0 0 0
  CHANNELS 0
}
MOTION
Frames: 1000000000000000000
Frame Time: 0.01
";
        assert!(matches!(parse(source), Err(ResourceError::BvhSyntax { line: 9, .. })));
    }

    #[test]
    fn test_deep_nesting_stops_at_joint_limit() {
        let depth = 100_000;
        let body = "OFFSET 0 1 0\nCHANNELS 3 Zrotation Xrotation Yrotation\n";
        let mut source = format!("HIERARCHY\nROOT J0\n{{\n{body}");
        for i in 1..depth {
            source.push_str(&format!("JOINT J{i}\n{{\n{body}"));
        }
        source.push_str(&"}\n".repeat(depth));
        source.push_str("MOTION\nFrames: 1\nFrame Time: 0.01\n");

        match parse(&source) {
            Err(ResourceError::InvalidClip(AnimationError::TooManyJoints { count, max })) => {
                assert_eq!(max, MAX_JOINTS);
                assert_eq!(count, MAX_JOINTS + 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_brace() {
        let source = SIMPLE.replacen("{", "", 1);
        assert!(matches!(parse(&source), Err(ResourceError::BvhSyntax { line: 4, .. })));
    }
}
