//! Joint hierarchy stored as an index-based forest.
//!
//! Joints live in a flat `Vec` indexed by [`JointId`]. Each joint carries
//! its full ancestor chain (root first), so evaluation never has to chase
//! parent links and cycle freedom is checked once when the skeleton is
//! built.

use std::fmt;

use glam::Vec3;

use crate::error::{AnimationError, AnimationResult};

/// Maximum number of joints a skeleton may have.
///
/// Bounded by the fixed-capacity model matrix array in the per-frame
/// uniform buffer.
pub const MAX_JOINTS: usize = 128;

/// Index of a joint within its skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointId(pub usize);

impl JointId {
    /// The root joint.
    pub const ROOT: JointId = JointId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node of the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub id: JointId,
    pub name: String,
    /// Offset from the parent joint in the parent's frame.
    pub rest_offset: Vec3,
    /// Ancestors from the root down to the immediate parent.
    pub parents: Vec<JointId>,
    /// `true` when no joint names this one as its parent.
    pub is_leaf: bool,
}

impl Joint {
    pub fn new(
        id: usize,
        name: impl Into<String>,
        rest_offset: Vec3,
        parents: Vec<JointId>,
        is_leaf: bool,
    ) -> Self {
        Self {
            id: JointId(id),
            name: name.into(),
            rest_offset,
            parents,
            is_leaf,
        }
    }

    /// Immediate parent, `None` for the root.
    pub fn parent(&self) -> Option<JointId> {
        self.parents.last().copied()
    }

    /// Depth in the hierarchy; the root is at depth 0.
    pub fn depth(&self) -> usize {
        self.parents.len()
    }
}

/// Immutable, validated joint hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    joints: Vec<Joint>,
}

impl Skeleton {
    /// Build a skeleton, checking every structural invariant.
    ///
    /// # Errors
    /// Returns an [`AnimationError`] if ids are not dense from 0, joint 0 is
    /// not the single root, an ancestor chain is not a prefix-consistent
    /// path from the root, a leaf flag is wrong, or an offset is not finite.
    pub fn new(joints: Vec<Joint>) -> AnimationResult<Self> {
        if joints.is_empty() {
            return Err(AnimationError::EmptySkeleton);
        }
        if joints.len() > MAX_JOINTS {
            return Err(AnimationError::TooManyJoints {
                count: joints.len(),
                max: MAX_JOINTS,
            });
        }

        let mut child_counts = vec![0usize; joints.len()];

        for (index, joint) in joints.iter().enumerate() {
            if joint.id.index() != index {
                return Err(AnimationError::NonDenseId {
                    index,
                    id: joint.id.index(),
                });
            }
            if !joint.rest_offset.is_finite() {
                return Err(AnimationError::NonFiniteOffset { id: index });
            }

            let Some(parent) = joint.parent() else {
                if index == 0 {
                    continue;
                }
                return Err(AnimationError::MultipleRoots {
                    id: index,
                    name: joint.name.clone(),
                });
            };

            if index == 0 {
                return Err(AnimationError::RootHasParents {
                    name: joint.name.clone(),
                });
            }
            if !joint.parents[0].is_root() {
                return Err(AnimationError::ChainNotRooted {
                    id: index,
                    first: joint.parents[0].index(),
                });
            }
            if let Some(bad) = joint.parents.iter().find(|p| p.index() >= index) {
                return Err(AnimationError::AncestorOutOfOrder {
                    id: index,
                    ancestor: bad.index(),
                });
            }

            // Parents precede children, so the parent's chain is already
            // validated; matching it as a prefix rules out cycles.
            let parent_chain = &joints[parent.index()].parents;
            let own_prefix = &joint.parents[..joint.parents.len() - 1];
            if parent_chain.as_slice() != own_prefix {
                return Err(AnimationError::InconsistentChain {
                    id: index,
                    parent: parent.index(),
                });
            }

            child_counts[parent.index()] += 1;
        }

        for (joint, &children) in joints.iter().zip(&child_counts) {
            if joint.is_leaf != (children == 0) {
                return Err(AnimationError::LeafMismatch {
                    id: joint.id.index(),
                    flagged: joint.is_leaf,
                    children,
                });
            }
        }

        tracing::debug!("Skeleton validated: {} joints", joints.len());

        Ok(Self { joints })
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id.index())
    }

    pub fn root(&self) -> &Joint {
        &self.joints[0]
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Always `false`; a validated skeleton has at least its root.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Direct children of `id`, in id order.
    pub fn children(&self, id: JointId) -> impl Iterator<Item = &Joint> {
        self.joints
            .iter()
            .filter(move |joint| joint.parent() == Some(id))
    }

    /// Look a joint up by name.
    pub fn find(&self, name: &str) -> Option<&Joint> {
        self.joints.iter().find(|joint| joint.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(ids: &[usize]) -> Vec<JointId> {
        ids.iter().copied().map(JointId).collect()
    }

    fn arm() -> Vec<Joint> {
        vec![
            Joint::new(0, "hips", Vec3::ZERO, vec![], false),
            Joint::new(1, "spine", Vec3::new(0.0, 10.0, 0.0), chain(&[0]), false),
            Joint::new(2, "head", Vec3::new(0.0, 5.0, 0.0), chain(&[0, 1]), true),
            Joint::new(3, "leg", Vec3::new(3.0, -8.0, 0.0), chain(&[0]), true),
        ]
    }

    #[test]
    fn test_valid_hierarchy() {
        let skeleton = Skeleton::new(arm()).unwrap();
        assert_eq!(skeleton.len(), 4);
        assert_eq!(skeleton.root().name, "hips");
        assert_eq!(skeleton.joint(JointId(2)).unwrap().depth(), 2);
        let children: Vec<_> = skeleton.children(JointId::ROOT).map(|j| j.id).collect();
        assert_eq!(children, chain(&[1, 3]));
        assert_eq!(skeleton.find("leg").unwrap().id, JointId(3));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(Skeleton::new(vec![]), Err(AnimationError::EmptySkeleton));
    }

    #[test]
    fn test_rejects_sparse_ids() {
        let mut joints = arm();
        joints[2].id = JointId(7);
        assert_eq!(
            Skeleton::new(joints),
            Err(AnimationError::NonDenseId { index: 2, id: 7 })
        );
    }

    #[test]
    fn test_rejects_second_root() {
        let mut joints = arm();
        joints[3].parents.clear();
        assert!(matches!(
            Skeleton::new(joints),
            Err(AnimationError::MultipleRoots { id: 3, .. })
        ));
    }

    #[test]
    fn test_rejects_forward_reference() {
        // 1 -> 2 -> 1 would be a cycle; it shows up as a forward reference.
        let mut joints = arm();
        joints[1].parents = chain(&[0, 2]);
        assert!(matches!(
            Skeleton::new(joints),
            Err(AnimationError::AncestorOutOfOrder { id: 1, ancestor: 2 })
        ));
    }

    #[test]
    fn test_rejects_chain_skipping_a_level() {
        let mut joints = arm();
        joints[2].parents = chain(&[0, 0, 1]);
        assert!(matches!(
            Skeleton::new(joints),
            Err(AnimationError::InconsistentChain { id: 2, parent: 1 })
        ));
    }

    #[test]
    fn test_rejects_unrooted_chain() {
        let mut joints = arm();
        joints[2].parents = chain(&[1]);
        assert!(matches!(
            Skeleton::new(joints),
            Err(AnimationError::ChainNotRooted { id: 2, first: 1 })
        ));
    }

    #[test]
    fn test_rejects_wrong_leaf_flag() {
        let mut joints = arm();
        joints[1].is_leaf = true;
        assert!(matches!(
            Skeleton::new(joints),
            Err(AnimationError::LeafMismatch { id: 1, flagged: true, children: 1 })
        ));
    }

    #[test]
    fn test_rejects_too_many_joints() {
        let mut joints = vec![Joint::new(0, "root", Vec3::ZERO, vec![], false)];
        for i in 1..=MAX_JOINTS {
            joints.push(Joint::new(i, format!("j{i}"), Vec3::X, chain(&[0]), true));
        }
        assert!(matches!(
            Skeleton::new(joints),
            Err(AnimationError::TooManyJoints { .. })
        ));
    }

    #[test]
    fn test_single_root_is_leaf() {
        let skeleton =
            Skeleton::new(vec![Joint::new(0, "root", Vec3::ZERO, vec![], true)]).unwrap();
        assert!(skeleton.root().is_leaf);
        assert!(skeleton.root().parent().is_none());
    }
}
