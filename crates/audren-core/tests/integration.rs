//! Integration tests for audren-core.
//!
//! Drives whole frames through [`AudioRenderer`]: topology building, splitter
//! re-routing, cycle rejection, sink offset reporting, and plan generation.

use audren_core::{
    AudioRenderer, BufferDescriptor, CircularBufferParameter, DeviceParameter, FINAL_MIX_ID,
    GraphError, LAST_REVISION, MixParameter, PoolMapper, RenderStep, RendererParameters,
    SinkConfig, SinkParameter, SplitterDestinationParameter, SplitterParameter, UNUSED_MIX_ID,
    UpdateError, UpdateInput,
};

fn mapper() -> PoolMapper {
    let mut mapper = PoolMapper::new();
    mapper.register(0x10_0000, 0x10_0000, 0x1_0000);
    mapper
}

fn renderer(parameters: RendererParameters) -> AudioRenderer<PoolMapper> {
    AudioRenderer::new(&parameters, mapper()).expect("valid renderer parameters")
}

fn frame<'a>(mixes: &'a [MixParameter]) -> UpdateInput<'a> {
    UpdateInput {
        mixes,
        ..UpdateInput::default()
    }
}

// ============================================================================
// 1. Topology
// ============================================================================

/// Five sub-mixes all routed to the final mix: five edges, and an identical
/// second frame changes nothing.
#[test]
fn star_toward_final_mix() {
    let mut renderer = renderer(RendererParameters {
        sub_mix_count: 5,
        effect_count: 0,
        sink_count: 0,
        ..RendererParameters::default()
    });

    let mixes: Vec<MixParameter> = (0..6)
        .map(|id| {
            if id == FINAL_MIX_ID {
                MixParameter::new(id)
            } else {
                MixParameter::new(id).with_destination(FINAL_MIX_ID)
            }
        })
        .collect();

    let first = renderer.update(&frame(&mixes)).expect("valid frame");
    assert!(first.resorted);
    assert_eq!(renderer.mixes().edges().edge_count(), 5);
    for id in 1..6 {
        assert!(renderer.mixes().edges().connected(id, 0));
    }
    assert_eq!(renderer.mixes().sorted().last(), Some(&0));

    let second = renderer.update(&frame(&mixes)).expect("valid frame");
    assert!(!second.resorted);
    assert_eq!(renderer.mixes().edges().edge_count(), 5);
}

/// Re-pointing one mix keeps exactly one outgoing edge and re-sorts.
#[test]
fn retargeting_keeps_one_outgoing_edge() {
    let mut renderer = renderer(RendererParameters {
        sub_mix_count: 3,
        effect_count: 0,
        sink_count: 0,
        splitter_count: 1,
        splitter_destination_count: 1,
        ..RendererParameters::default()
    });

    let mut mixes = vec![
        MixParameter::new(0),
        MixParameter::new(1).with_destination(0),
        MixParameter::new(2).with_destination(0),
        MixParameter::new(3).with_destination(1),
    ];
    renderer.update(&frame(&mixes)).expect("valid frame");
    assert_eq!(renderer.mixes().sorted().first(), Some(&3));

    mixes[3] = MixParameter::new(3).with_destination(2);
    let output = renderer.update(&frame(&mixes)).expect("valid frame");
    assert!(output.resorted);
    assert!(!renderer.mixes().edges().connected(3, 1));
    assert!(renderer.mixes().edges().connected(3, 2));
    assert_eq!(renderer.mixes().edges().outgoing(3).count(), 1);

    let sorted = renderer.mixes().sorted();
    let position = |id| sorted.iter().position(|&m| m == id);
    assert!(position(3) < position(2));
    assert!(position(2) < position(0));
}

// ============================================================================
// 2. Splitters
// ============================================================================

/// X routes through splitter {A, B}: only X -> A exists, and a splitter
/// update forces X to recompute its edge even when X's parameters repeat.
#[test]
fn splitter_route_and_forced_recompute() {
    let mut renderer = renderer(RendererParameters {
        sub_mix_count: 3,
        effect_count: 0,
        sink_count: 0,
        splitter_count: 1,
        splitter_destination_count: 2,
        revision: LAST_REVISION,
        ..RendererParameters::default()
    });

    let (a, b, x) = (1, 2, 3);
    let mixes = [
        MixParameter::new(0),
        MixParameter::new(a).with_destination(0),
        MixParameter::new(b).with_destination(0),
        MixParameter::new(x).with_splitter(0),
    ];
    let splitters = [SplitterParameter {
        id: 0,
        sample_rate: 48_000,
        destination_ids: vec![0, 1],
    }];
    let destinations = [
        SplitterDestinationParameter::new(0, a),
        SplitterDestinationParameter::new(1, b),
    ];
    let with_splitter = UpdateInput {
        splitters: &splitters,
        splitter_destinations: &destinations,
        mixes: &mixes,
        ..UpdateInput::default()
    };

    renderer.update(&with_splitter).expect("valid frame");
    let edges = renderer.mixes().edges();
    assert!(edges.connected(x as usize, a as usize));
    assert!(!edges.connected(x as usize, b as usize));
    assert_eq!(edges.edge_count(), 3);

    // The splitter is re-sent unchanged: its flag forces X to recompute.
    let output = renderer.update(&with_splitter).expect("valid frame");
    assert!(output.resorted);

    // Nothing touched the splitter: X stays clean.
    let output = renderer.update(&frame(&mixes)).expect("valid frame");
    assert!(!output.resorted);
    assert!(renderer.mixes().edges().connected(x as usize, a as usize));
}

/// A splitter whose first destination is unused resolves to the next one.
#[test]
fn splitter_skips_unused_first_destination() {
    let mut renderer = renderer(RendererParameters {
        sub_mix_count: 2,
        effect_count: 0,
        sink_count: 0,
        splitter_count: 1,
        splitter_destination_count: 2,
        ..RendererParameters::default()
    });

    let mixes = [
        MixParameter::new(0),
        MixParameter::new(1).with_destination(0),
        MixParameter::new(2).with_splitter(0),
    ];
    let splitters = [SplitterParameter {
        id: 0,
        sample_rate: 48_000,
        destination_ids: vec![0, 1],
    }];
    let destinations = [
        SplitterDestinationParameter::new(0, UNUSED_MIX_ID),
        SplitterDestinationParameter::new(1, 1),
    ];
    renderer
        .update(&UpdateInput {
            splitters: &splitters,
            splitter_destinations: &destinations,
            mixes: &mixes,
            ..UpdateInput::default()
        })
        .expect("valid frame");
    assert!(renderer.mixes().edges().connected(2, 1));
    assert_eq!(renderer.mixes().sorted(), &[2, 1, 0]);
}

/// A routing loop is rejected as a sorting failure.
#[test]
fn routing_cycle_fails_closed() {
    let mut renderer = renderer(RendererParameters {
        sub_mix_count: 2,
        effect_count: 0,
        sink_count: 0,
        splitter_count: 1,
        splitter_destination_count: 1,
        ..RendererParameters::default()
    });

    let mixes = [
        MixParameter::new(0),
        MixParameter::new(1).with_destination(2),
        MixParameter::new(2).with_destination(1),
    ];
    let err = renderer.update(&frame(&mixes)).expect_err("cycle");
    assert!(matches!(
        err,
        UpdateError::InvalidMixSorting(GraphError::CycleDetected { .. })
    ));
    assert!(renderer.generate_plan().sub_mix_order().is_empty());
}

/// Without splitters the distance sort still rejects a routing loop, at the
/// oldest revision as well as the newest.
#[test]
fn routing_cycle_without_splitters_fails_closed() {
    for revision in [1, LAST_REVISION] {
        let mut renderer = renderer(RendererParameters {
            sub_mix_count: 2,
            effect_count: 0,
            sink_count: 0,
            splitter_count: 0,
            splitter_destination_count: 0,
            revision,
            ..RendererParameters::default()
        });

        let mixes = [
            MixParameter::new(0),
            MixParameter::new(1).with_destination(2),
            MixParameter::new(2).with_destination(1),
        ];
        let err = renderer.update(&frame(&mixes)).expect_err("cycle");
        assert!(matches!(
            err,
            UpdateError::InvalidMixSorting(GraphError::CycleDetected { .. })
        ));
        assert!(renderer.generate_plan().sub_mix_order().is_empty());
    }
}

// ============================================================================
// 3. Sinks
// ============================================================================

fn ring_sink() -> SinkParameter {
    SinkParameter {
        is_used: true,
        node_id: 1,
        config: SinkConfig::CircularBuffer(CircularBufferParameter {
            buffer: BufferDescriptor::new(0x10_0000, 0x1000),
            input_count: 2,
            sample_count: 240,
            sample_rate: 48_000,
            ..CircularBufferParameter::default()
        }),
    }
}

/// The guest sees a circular buffer offset one rendered frame behind.
#[test]
fn circular_buffer_offset_lags_one_frame() {
    let mut renderer = renderer(RendererParameters {
        sub_mix_count: 0,
        effect_count: 0,
        sink_count: 1,
        ..RendererParameters::default()
    });

    let mixes = [MixParameter::new(0)];
    let sinks = [ring_sink()];
    let input = UpdateInput {
        mixes: &mixes,
        sinks: &sinks,
        ..UpdateInput::default()
    };

    let mut reported = Vec::new();
    for _ in 0..3 {
        let output = renderer.update(&input).expect("valid frame");
        reported.push(output.sinks[0].last_written_offset);
        renderer.generate_plan();
    }
    // 2 bytes * 240 samples * 2 inputs per frame.
    assert_eq!(reported, vec![0, 0, 960]);
}

/// A device parameter sent to a circular buffer slot is replaced, not merged;
/// a stale kind never leaks into the plan.
#[test]
fn sink_kind_change_resets_slot() {
    let mut renderer = renderer(RendererParameters {
        sub_mix_count: 0,
        effect_count: 0,
        sink_count: 1,
        ..RendererParameters::default()
    });
    let mixes = [MixParameter::new(0)];

    let ring = [ring_sink()];
    renderer
        .update(&UpdateInput {
            mixes: &mixes,
            sinks: &ring,
            ..UpdateInput::default()
        })
        .expect("valid frame");
    assert_eq!(renderer.mapper().pool(0).map(|p| p.attachments()), Some(1));

    let device = [SinkParameter {
        is_used: true,
        node_id: 2,
        config: SinkConfig::Device(DeviceParameter {
            name: "MainAudioOut".into(),
            input_count: 2,
            ..DeviceParameter::default()
        }),
    }];
    renderer
        .update(&UpdateInput {
            mixes: &mixes,
            sinks: &device,
            ..UpdateInput::default()
        })
        .expect("valid frame");
    assert_eq!(renderer.mapper().pool(0).map(|p| p.attachments()), Some(0));

    let plan = renderer.generate_plan();
    assert!(matches!(
        plan.steps.last(),
        Some(RenderStep::Sink { sink: 0, node_id: 2, upsampler: None })
    ));
}
