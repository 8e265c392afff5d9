use serde_json::json;
use sketch_core::hash::{CwtParams, MmtParams};
use sketch_core::partition::block_range;
use sketch_core::{
    CauchyScale, Engine, HashSketch, Layout, LocalParams, Rademacher, RandomContext,
    SerializationPolicy, SketchDescription, SketchError,
};

const ENGINES: [Engine; 3] = [Engine::ChaCha20, Engine::ChaCha8, Engine::Xxh3];

fn cwt(n: i64, s: i64, seed: u64, engine: Engine) -> CwtParams {
    CwtParams::new(n, s, RandomContext::with_engine(seed, engine), Rademacher).unwrap()
}

#[test]
fn independent_contexts_agree() {
    for engine in ENGINES {
        let a = cwt(500, 17, 2024, engine);
        let b = cwt(500, 17, 2024, engine);
        assert_eq!(a.row_idx().unwrap(), b.row_idx().unwrap());
        assert_eq!(a.row_value().unwrap(), b.row_value().unwrap());
    }
}

#[test]
fn six_coordinates_into_three() {
    let first = cwt(6, 3, 42, Engine::default());
    let second = cwt(6, 3, 42, Engine::default());
    assert_eq!(first.row_idx().unwrap(), second.row_idx().unwrap());
    assert_eq!(first.row_value().unwrap(), second.row_value().unwrap());
    assert_eq!(first.row_idx().unwrap().len(), 6);
    assert_eq!(first.row_value().unwrap().len(), 6);

    let other = cwt(6, 3, 43, Engine::default());
    assert!(
        first.row_idx().unwrap() != other.row_idx().unwrap()
            || first.row_value().unwrap() != other.row_value().unwrap()
    );
}

#[test]
fn targets_stay_within_sketch_dimension() {
    for engine in ENGINES {
        for s in [1, 2, 3, 31, 1000] {
            let params = cwt(400, s, 9, engine);
            assert!(params.row_idx().unwrap().iter().all(|&t| t < s as usize));
            assert!(params.row_value().unwrap().iter().all(|&v| v != 0.0));
        }
    }
}

#[test]
fn single_output_coordinate() {
    let params = cwt(10, 1, 3, Engine::default());
    assert!(params.row_idx().unwrap().iter().all(|&t| t == 0));
}

#[test]
fn every_split_point_concatenates_to_full_build() {
    let n = 40;
    for engine in ENGINES {
        let params = cwt(n as i64, 5, 77, engine);
        let full_idx = params.row_idx().unwrap().to_vec();
        let full_val = params.row_value().unwrap().to_vec();
        for k in 0..=n {
            let left = params.build_range(0..k).unwrap();
            let right = params.build_range(k..n).unwrap();
            let idx: Vec<usize> = left.row_idx.iter().chain(&right.row_idx).copied().collect();
            let val: Vec<f64> = left.row_value.iter().chain(&right.row_value).copied().collect();
            assert_eq!(idx, full_idx, "split at {}", k);
            assert_eq!(val, full_val, "split at {}", k);
        }
    }
}

#[test]
fn processes_build_slices_without_communication() {
    let n = 103;
    let size = 4;
    let reference = MmtParams::new(
        n as i64,
        9,
        RandomContext::new(5),
        CauchyScale::standard().unwrap(),
    )
    .unwrap();

    for layout in [Layout::Block, Layout::Cyclic] {
        // Each "process" reconstructs the sketch from the shared description.
        let description = reference.describe(SerializationPolicy::SeedReplay).unwrap();
        let json = description.to_json().unwrap();
        let parts: Vec<LocalParams> = (0..size)
            .map(|rank| {
                let local = HashSketch::from_description(&SketchDescription::from_json(&json).unwrap())
                    .unwrap();
                let owned = layout.owned(n, rank, size).unwrap();
                let part = local.build_local(&owned).unwrap();
                LocalParams::from_bytes(&part.to_bytes().unwrap()).unwrap()
            })
            .collect();

        let (row_idx, row_value) = LocalParams::assemble(parts, n).unwrap();
        assert_eq!(row_idx, reference.row_idx().unwrap());
        assert_eq!(row_value, reference.row_value().unwrap());
    }
}

#[test]
fn block_ranges_match_block_layout() {
    for rank in 0..3 {
        let range = block_range(10, rank, 3).unwrap();
        assert_eq!(
            Layout::Block.owned(10, rank, 3).unwrap(),
            range.collect::<Vec<_>>()
        );
    }
}

#[test]
fn build_twice_is_stable() {
    let params = cwt(64, 8, 1, Engine::Xxh3);
    params.build().unwrap();
    let idx = params.row_idx().unwrap().to_vec();
    let val = params.row_value().unwrap().to_vec();
    params.build().unwrap();
    assert_eq!(params.row_idx().unwrap(), idx.as_slice());
    assert_eq!(params.row_value().unwrap(), val.as_slice());
}

#[test]
fn json_round_trip_replays_seed() {
    for engine in ENGINES {
        let original = cwt(128, 12, 31337, engine);
        let json = original
            .describe(SerializationPolicy::SeedReplay)
            .unwrap()
            .to_json()
            .unwrap();
        let restored =
            CwtParams::from_description(&SketchDescription::from_json(&json).unwrap(), Rademacher)
                .unwrap();
        assert_eq!(restored.context(), original.context());
        assert_eq!(restored.row_idx().unwrap(), original.row_idx().unwrap());
        assert_eq!(restored.row_value().unwrap(), original.row_value().unwrap());
    }
}

#[test]
fn embedded_arrays_survive_json() {
    let original = HashSketch::new("WZT", 50, 6, RandomContext::new(4), Some(1.0)).unwrap();
    let json = original
        .describe(SerializationPolicy::EmbedArrays)
        .unwrap()
        .to_json_pretty()
        .unwrap();
    let restored = HashSketch::from_description(&SketchDescription::from_json(&json).unwrap())
        .unwrap();
    assert!(restored.is_built());
    assert_eq!(restored.row_idx().unwrap(), original.row_idx().unwrap());
    assert_eq!(restored.row_value().unwrap(), original.row_value().unwrap());
}

#[test]
fn invalid_shapes_fail_without_object() {
    let ctx = RandomContext::new(42);
    assert!(matches!(
        CwtParams::new(0, 3, ctx, Rademacher),
        Err(SketchError::InvalidDimension { name: "N", value: 0 })
    ));
    assert!(matches!(
        CwtParams::new(6, -1, ctx, Rademacher),
        Err(SketchError::InvalidDimension { name: "S", value: -1 })
    ));
}

#[test]
fn description_without_s_is_rejected() {
    let result = SketchDescription::from_value(json!({
        "N": 6,
        "type": "CWT",
        "context": {"seed": 42}
    }));
    assert!(matches!(result, Err(SketchError::Deserialization(_))));
}

#[test]
fn description_with_unknown_type_is_rejected() {
    let description = SketchDescription::from_value(json!({
        "N": 6,
        "S": 3,
        "type": "FJLT",
        "context": {"seed": 42}
    }))
    .unwrap();
    assert!(matches!(
        HashSketch::from_description(&description),
        Err(SketchError::Deserialization(_))
    ));
    assert!(matches!(
        CwtParams::from_description(&description, Rademacher),
        Err(SketchError::Deserialization(_))
    ));
}

#[test]
fn derived_contexts_give_independent_sketches() {
    let root = RandomContext::new(10);
    let a = CwtParams::new(200, 16, root.derive(0), Rademacher).unwrap();
    let b = CwtParams::new(200, 16, root.derive(1), Rademacher).unwrap();
    assert_ne!(a.row_idx().unwrap(), b.row_idx().unwrap());

    let replayed = CwtParams::from_description(
        &a.describe(SerializationPolicy::SeedReplay).unwrap(),
        Rademacher,
    )
    .unwrap();
    assert_eq!(replayed.row_idx().unwrap(), a.row_idx().unwrap());
}
