use image::{Rgba, RgbaImage};
use rand::SeedableRng;
use rand::rngs::StdRng;

use morphfield::error::MorphError;
use morphfield::mesh::MeshSource;
use morphfield::morph::{FrameBinding, FrameClock};
use morphfield::models::{Dimensions, ParticleInstance, ParticleUniform};
use morphfield::normalizer::{NormalizedModels, normalize};
use morphfield::particles::{ModelSnapshot, sample_frame};
use morphfield::simulation::StateTexels;
use morphfield::transition::{Easing, TransitionController, TransitionStatus};

fn mesh(vertex_count: usize, model: usize) -> MeshSource {
    let shade = (model * 80) as u8;
    MeshSource::new(
        (0..vertex_count)
            .map(|i| {
                let t = i as f32 / vertex_count as f32;
                [t * (model + 1) as f32, (t * 6.0).sin(), model as f32]
            })
            .collect(),
        (0..vertex_count).map(|i| [i as f32 / vertex_count as f32, 0.5]).collect(),
        RgbaImage::from_fn(8, 8, |x, _| Rgba([shade, (x * 30) as u8, 255 - shade, 255])),
    )
}

fn three_models() -> (Vec<MeshSource>, NormalizedModels) {
    let meshes = vec![mesh(500, 0), mesh(1200, 1), mesh(800, 2)];
    let mut rng = StdRng::seed_from_u64(2024);
    let normalized = normalize(&meshes, &mut rng).unwrap();
    (meshes, normalized)
}

#[test]
fn three_models_normalize_to_the_largest() {
    let (meshes, normalized) = three_models();
    assert_eq!(normalized.particle_count, 1200);
    for (mesh, buffer) in meshes.iter().zip(&normalized.buffers) {
        assert_eq!(buffer.len(), 1200);
        for (position, uv) in buffer.positions.iter().zip(&buffer.uvs) {
            let found = mesh
                .positions
                .iter()
                .zip(&mesh.uvs)
                .any(|(p, u)| p == position && u == uv);
            assert!(found, "particle {position:?} is not a vertex of its model");
        }
    }
}

#[test]
fn select_model_morphs_then_commits() {
    let mut controller = TransitionController::new(3, 2.0, Easing::Linear);
    assert_eq!(controller.active(), 0);
    controller.request_transition(1).unwrap();

    let mut last_progress = 0.0;
    let mut frame = 0;
    let status = loop {
        let time = frame as f32 / 60.0;
        let status = controller.tick(time);
        assert!(controller.progress() >= last_progress);
        last_progress = controller.progress();
        if let TransitionStatus::Finished { .. } = status {
            break status;
        }
        assert_eq!(controller.active(), 0);
        frame += 1;
        assert!(frame < 1000, "transition never finished");
    };

    assert_eq!(status, TransitionStatus::Finished { source: 0, target: 1 });
    assert_eq!(controller.progress(), 1.0);
    // 2 seconds at 60 fps
    assert_eq!(frame, 120);

    assert_eq!(controller.commit(), Some(1));
    assert_eq!(controller.active(), 1);
    assert_eq!(controller.progress(), 0.0);
    assert!(controller.request_transition(0).is_ok());
}

#[test]
fn rapid_requests_keep_only_the_first_target() {
    let mut controller = TransitionController::new(3, 2.0, Easing::Linear);
    controller.request_transition(1).unwrap();
    let second = controller.request_transition(2);
    assert!(matches!(second, Err(MorphError::Busy { in_flight_target: 1 })));

    controller.tick(0.0);
    controller.tick(2.0);
    controller.commit();
    assert_eq!(controller.active(), 1);
}

#[test]
fn blended_frames_match_single_models_at_the_ends() {
    let (meshes, normalized) = three_models();
    let mut states: Vec<StateTexels> = normalized
        .buffers
        .iter()
        .map(|buffer| StateTexels::seed(buffer, normalized.side))
        .collect();
    for state in &mut states {
        state.advance(0.0);
    }
    let instances = ParticleInstance::build(&normalized.lookup, &normalized.sizes);
    let snapshot = |model: usize| ModelSnapshot {
        state: &states[model],
        appearance: &meshes[model].texture,
        surface_uvs: &normalized.buffers[model].uvs,
    };
    let uniform = |progress: f32| {
        let mut uniform = ParticleUniform::new(Dimensions::new(800.0, 600.0, 1.0), 0.05, normalized.side);
        uniform.progress = progress;
        uniform
    };

    let start = sample_frame(&instances, &snapshot(0), &snapshot(2), &uniform(0.0));
    let source_only = sample_frame(&instances, &snapshot(0), &snapshot(0), &uniform(0.0));
    let end = sample_frame(&instances, &snapshot(0), &snapshot(2), &uniform(1.0));
    let target_only = sample_frame(&instances, &snapshot(2), &snapshot(2), &uniform(0.0));

    assert_eq!(start.len(), 1200);
    assert!(start.iter().zip(&source_only).all(|(a, b)| a.approx_eq(b, 1e-5)));
    assert!(end.iter().zip(&target_only).all(|(a, b)| a.approx_eq(b, 1e-5)));
}

#[test]
fn resize_only_touches_resolution() {
    let (_, normalized) = three_models();
    let mut uniform = ParticleUniform::new(Dimensions::new(800.0, 600.0, 1.0), 0.05, normalized.side);
    uniform.progress = 0.3;
    let before = uniform;

    uniform.set_viewport(Dimensions::from_physical(3200, 2400, 2.0, 2.0));

    assert_eq!(uniform.resolution, [3200.0, 2400.0]);
    assert_ne!(uniform.resolution, before.resolution);
    assert_eq!(uniform.base_size, before.base_size);
    assert_eq!(uniform.progress, before.progress);
    assert_eq!(uniform.side, before.side);
}

#[test]
fn frame_clock_commits_after_the_last_frame() {
    let mut clock = FrameClock::new(TransitionController::new(3, 2.0, Easing::Linear));
    clock.select_model(1).unwrap();

    let mut frame = 0;
    let last = loop {
        let plan = clock.begin_frame(frame as f32 / 60.0);
        if frame > 0 {
            assert!((plan.delta_time - 1.0 / 60.0).abs() < 1e-4);
        }
        if let TransitionStatus::Finished { .. } = plan.status {
            break plan;
        }
        assert_eq!(plan.binding.source, 0);
        assert_eq!(plan.binding.target, 1);
        assert_eq!(clock.end_frame(plan.status), None);
        frame += 1;
        assert!(frame < 1000, "transition never finished");
    };

    assert_eq!(frame, 120);
    assert_eq!(last.binding, FrameBinding { source: 0, target: 1, progress: 1.0 });
    assert_eq!(clock.end_frame(last.status), Some(FrameBinding::settled(1)));
    assert_eq!(clock.controller().active(), 1);
}

#[test]
fn zero_sized_texture_aborts_normalization() {
    let meshes = vec![mesh(10, 0), MeshSource::new(vec![[0.0; 3]; 4], vec![[0.5; 2]; 4], RgbaImage::new(0, 0))];
    let mut rng = StdRng::seed_from_u64(0);
    let err = normalize(&meshes, &mut rng).unwrap_err();
    assert!(matches!(err, MorphError::InvalidTexture { model: 1, .. }));
}

#[test]
fn zero_vertex_model_aborts_normalization() {
    let meshes = vec![mesh(10, 0), MeshSource::new(vec![], vec![], RgbaImage::new(1, 1))];
    let mut rng = StdRng::seed_from_u64(0);
    let err = normalize(&meshes, &mut rng).unwrap_err();
    assert!(matches!(err, MorphError::EmptyMesh { model: 1 }));
}
