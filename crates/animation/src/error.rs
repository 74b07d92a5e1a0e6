//! Error types for skeleton and motion validation.

use thiserror::Error;

/// Structural problems found while building a skeleton or motion table,
/// plus the one caller error the evaluator reports.
///
/// A clip that passed validation is never rejected by the evaluator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    /// The skeleton has no joints at all.
    #[error("skeleton has no joints")]
    EmptySkeleton,

    /// More joints than the per-frame uniform array can hold.
    #[error("skeleton has {count} joints, at most {max} are supported")]
    TooManyJoints { count: usize, max: usize },

    /// Joint ids must be dense from 0 and stored in id order.
    #[error("joint at index {index} has id {id}; ids must be dense from 0")]
    NonDenseId { index: usize, id: usize },

    /// Joint 0 must be the single root.
    #[error("joint 0 ('{name}') must be the root but lists ancestors")]
    RootHasParents { name: String },

    /// A second joint without ancestors.
    #[error("joint {id} ('{name}') has no ancestors; only joint 0 may be a root")]
    MultipleRoots { id: usize, name: String },

    /// An ancestor chain that does not start at the root.
    #[error("ancestor chain of joint {id} starts at {first}, not at the root")]
    ChainNotRooted { id: usize, first: usize },

    /// An ancestor id that is not smaller than the joint's own id.
    #[error("joint {id} lists ancestor {ancestor}, which does not precede it")]
    AncestorOutOfOrder { id: usize, ancestor: usize },

    /// The chain does not equal the parent's chain plus the parent.
    #[error("ancestor chain of joint {id} does not extend the chain of its parent {parent}")]
    InconsistentChain { id: usize, parent: usize },

    /// A leaf flag that disagrees with the hierarchy.
    #[error("joint {id} leaf flag is {flagged} but it has {children} children")]
    LeafMismatch {
        id: usize,
        flagged: bool,
        children: usize,
    },

    /// A rest offset with NaN or infinite components.
    #[error("joint {id} has a non-finite rest offset")]
    NonFiniteOffset { id: usize },

    /// The motion table has no frames.
    #[error("motion table has no frames")]
    NoFrames,

    /// The per-frame duration is zero, negative or not finite.
    #[error("invalid frame duration {0}")]
    InvalidFrameDuration(f32),

    /// A frame whose sample count differs from the first frame's.
    #[error("frame {frame} has {found} samples, expected {expected}")]
    FrameWidthMismatch {
        frame: usize,
        expected: usize,
        found: usize,
    },

    /// A sample with NaN or infinite components.
    #[error("frame {frame} joint {joint} has a non-finite sample")]
    NonFiniteSample { frame: usize, joint: usize },

    /// The motion table covers a different joint set than the skeleton.
    #[error("motion table covers {motion} joints but the skeleton has {skeleton}")]
    JointCountMismatch { skeleton: usize, motion: usize },

    /// An output buffer with room for fewer matrices than there are joints.
    #[error("output holds {len} matrices but the skeleton has {joints} joints")]
    OutputTooShort { len: usize, joints: usize },
}

/// Result type alias for animation operations.
pub type AnimationResult<T> = Result<T, AnimationError>;
