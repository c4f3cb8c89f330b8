//! Property-based tests for audren-core graph invariants.
//!
//! Tests that acyclic routing always sorts with sources first, that rerouting
//! never leaves more than one outgoing edge per mix, and that effect chains are
//! rebuilt deterministically from processing orders.

use audren_core::{
    AudioRenderer, BiquadFilterParams, EffectParameter, EffectParams, MixParameter, PoolMapper,
    RendererParameters, UpdateInput,
};
use proptest::prelude::*;

fn renderer(sub_mix_count: usize, effect_count: usize) -> AudioRenderer<PoolMapper> {
    let parameters = RendererParameters {
        sub_mix_count: sub_mix_count as u32,
        effect_count: effect_count as u32,
        sink_count: 0,
        splitter_count: 1,
        splitter_destination_count: 1,
        ..RendererParameters::default()
    };
    AudioRenderer::new(&parameters, PoolMapper::new()).expect("valid renderer parameters")
}

/// Every mix `i > 0` routes to `targets[i - 1] % i`, which is always a lower id.
fn downward_routing(targets: &[usize]) -> Vec<MixParameter> {
    std::iter::once(MixParameter::new(0))
        .chain(targets.iter().enumerate().map(|(slot, &target)| {
            let id = slot + 1;
            MixParameter::new(id as i32).with_destination((target % id) as i32)
        }))
        .collect()
}

fn biquad(mix_id: i32, processing_order: i32) -> EffectParameter {
    EffectParameter {
        mix_id,
        processing_order,
        ..EffectParameter::new(EffectParams::BiquadFilter(BiquadFilterParams::default()))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Routing every mix toward a lower id never produces a cycle, however
    /// often the routes change, and each mix keeps at most one outgoing edge.
    #[test]
    fn downward_routing_always_sorts(
        rounds in prop::collection::vec(prop::collection::vec(0usize..64, 1..12), 1..6),
    ) {
        let sub_mix_count = rounds.iter().map(Vec::len).max().unwrap_or(1);
        let mut renderer = renderer(sub_mix_count, 0);

        for targets in &rounds {
            let mut padded = targets.clone();
            padded.resize(sub_mix_count, 0);
            let mixes = downward_routing(&padded);

            renderer
                .update(&UpdateInput { mixes: &mixes, ..UpdateInput::default() })
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let graph = renderer.mixes();
            let sorted = graph.sorted();
            prop_assert_eq!(sorted.len(), sub_mix_count + 1);
            prop_assert_eq!(sorted.last(), Some(&0));

            for from in 0..graph.len() {
                let outgoing: Vec<usize> = graph.edges().outgoing(from).collect();
                prop_assert!(outgoing.len() <= 1, "mix {} has edges {:?}", from, outgoing);
                for to in outgoing {
                    let source = sorted.iter().position(|&m| m == from);
                    let destination = sorted.iter().position(|&m| m == to);
                    prop_assert!(source < destination, "{} sorted after {}", from, to);
                }
            }
        }
    }

    /// Each filled chain slot holds the highest-indexed effect of that mix
    /// with that processing order, and an identical frame rebuilds the same
    /// chains.
    #[test]
    fn effect_order_is_stable(
        effects in prop::collection::vec((0i32..3, -1i32..6), 1..6),
    ) {
        let effect_count = effects.len();
        let mut renderer = renderer(2, effect_count);
        let parameters: Vec<EffectParameter> = effects
            .iter()
            .map(|&(mix, order)| biquad(mix, order.min(effect_count as i32 - 1)))
            .collect();
        let mixes = vec![
            MixParameter::new(0),
            MixParameter::new(1).with_destination(0),
            MixParameter::new(2).with_destination(0),
        ];
        let input = UpdateInput {
            effects: &parameters,
            mixes: &mixes,
            ..UpdateInput::default()
        };

        renderer.update(&input).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let first: Vec<Vec<Option<usize>>> = renderer
            .mixes()
            .iter()
            .map(|m| m.effect_order().to_vec())
            .collect();

        for (mix_id, chain) in first.iter().enumerate() {
            for (slot, entry) in chain.iter().enumerate() {
                let expected = parameters
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.mix_id == mix_id as i32 && p.processing_order == slot as i32)
                    .map(|(index, _)| index)
                    .max();
                prop_assert_eq!(*entry, expected);
            }
        }

        renderer.update(&input).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let second: Vec<Vec<Option<usize>>> = renderer
            .mixes()
            .iter()
            .map(|m| m.effect_order().to_vec())
            .collect();
        prop_assert_eq!(first, second);
    }
}
