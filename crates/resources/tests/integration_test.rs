//! Integration tests for motion loading and scene packing.

use std::path::Path;

use glam::Vec3;
use mocap_animation::Evaluator;
use mocap_resources::{AXES_SLOT, FLOOR_SLOT, ResourceError, SceneLayout, build_scene, bvh};

fn fixture() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/two_legs.bvh"))
}

fn layout() -> SceneLayout {
    SceneLayout {
        floor_size: [1000.0, 1000.0],
        floor_divisions: [10, 10],
        floor_color: Vec3::new(0.2, 0.9, 0.2),
        axes_size: 40.0,
    }
}

#[test]
fn test_load_bvh_file() {
    let clip = bvh::load(fixture()).expect("Failed to load BVH fixture");

    let skeleton = clip.skeleton();
    assert_eq!(skeleton.len(), 9);
    assert_eq!(skeleton.root().name, "Hips");
    assert_eq!(
        skeleton.joints().iter().filter(|j| j.is_leaf).count(),
        3,
        "each End Site becomes a leaf"
    );

    let motion = clip.motion();
    assert_eq!(motion.frame_count(), 4);
    assert_eq!(motion.joint_count(), skeleton.len());

    println!("{}", clip.skeleton_info());
    println!("{}", clip.motion_info());
}

#[test]
fn test_loaded_clip_drives_scene() {
    let clip = bvh::load(fixture()).unwrap();
    let geometry = build_scene(clip.skeleton(), &layout()).unwrap();
    assert_eq!(geometry.draws.len(), clip.skeleton().len() + 2);
    let slots: Vec<usize> = geometry.draws.iter().map(|d| d.model_slot as usize).collect();
    assert!(slots.contains(&FLOOR_SLOT));
    assert!(slots.contains(&AXES_SLOT));

    let evaluator = Evaluator::new(clip);
    let loop_duration = evaluator.clip().motion().loop_duration();
    for step in 0..40 {
        let t = loop_duration * step as f32 / 40.0;
        let matrices = evaluator.evaluate(t);
        assert_eq!(matrices.len(), evaluator.joint_count());
        assert!(matrices.iter().all(|m| m.is_finite()));

        // Hips stay above the floor plane after the Y-up to Z-up change.
        assert!(matrices[0].w_axis.z > 80.0);
    }
}

#[test]
fn test_missing_file_is_reported() {
    let result = bvh::load(Path::new("tests/data/missing.bvh"));
    assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
}
