//! Mixing buses and the mix graph.
//!
//! Mixes are preallocated once and overwritten in place every frame; a mix is
//! "deleted" by clearing `is_used`. Slot 0 is the final mix. Every other used
//! mix routes to at most one destination, either a mix directly or the first
//! live destination of a splitter, and that route is mirrored as a single row
//! in the context's [`EdgeMatrix`].
//!
//! [`Mix::update`] reports whether the mix's connectivity changed. When any
//! mix is dirty, [`MixContext::update`] re-sorts the graph: through the edge
//! matrix when splitters are in use (failing on cycles), otherwise by
//! descending distance from the final mix.

use crate::behaviour::BehaviourContext;
use crate::constants::{
    FINAL_MIX_ID, MixVolumeMatrix, TARGET_SAMPLE_RATE, UNUSED_MIX_ID, UNUSED_SPLITTER_ID,
    mix_index, splitter_index,
};
use crate::effect::EffectContext;
use crate::error::{Result, UpdateError};
use crate::graph::{CommandOrdering, EdgeMatrix};
use crate::splitter::SplitterContext;

/// One frame's parameters for a mix.
#[derive(Clone, Debug, PartialEq)]
pub struct MixParameter {
    /// Mix id. Names the slot to update when dirty-only updates are in effect.
    pub mix_id: i32,
    /// Output gain.
    pub volume: f32,
    /// Sample rate.
    pub sample_rate: u32,
    /// Number of mix buffers owned.
    pub buffer_count: u32,
    /// Whether the mix is active.
    pub is_used: bool,
    /// Diagnostics correlation id.
    pub node_id: u32,
    /// Direct destination, or [`UNUSED_MIX_ID`].
    pub destination_mix_id: i32,
    /// Splitter destination, or [`UNUSED_SPLITTER_ID`].
    pub destination_splitter_id: u32,
    /// Gain from each source buffer to each destination buffer.
    pub volumes: Box<MixVolumeMatrix>,
}

impl MixParameter {
    /// A used, unrouted mix with unit volume and a silent matrix.
    pub fn new(mix_id: i32) -> Self {
        Self {
            mix_id,
            volume: 1.0,
            sample_rate: TARGET_SAMPLE_RATE,
            buffer_count: 1,
            is_used: true,
            node_id: 0,
            destination_mix_id: UNUSED_MIX_ID,
            destination_splitter_id: UNUSED_SPLITTER_ID,
            volumes: Box::default(),
        }
    }

    /// Routes directly to `destination`.
    #[must_use]
    pub fn with_destination(mut self, destination: i32) -> Self {
        self.destination_mix_id = destination;
        self
    }

    /// Routes through `splitter`.
    #[must_use]
    pub fn with_splitter(mut self, splitter: u32) -> Self {
        self.destination_splitter_id = splitter;
        self
    }
}

impl Default for MixParameter {
    fn default() -> Self {
        Self {
            is_used: false,
            ..Self::new(UNUSED_MIX_ID)
        }
    }
}

/// A mix slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Mix {
    index: usize,
    mix_id: i32,
    volume: f32,
    sample_rate: u32,
    buffer_count: u32,
    buffer_offset: u32,
    is_used: bool,
    node_id: u32,
    destination_mix: Option<usize>,
    destination_splitter: Option<usize>,
    distance_from_final_mix: Option<u32>,
    effect_order: Box<[Option<usize>]>,
    volumes: Box<MixVolumeMatrix>,
}

impl Mix {
    /// An unused mix in slot `index` whose effect chain holds up to
    /// `effect_capacity` entries.
    pub fn new(index: usize, effect_capacity: usize) -> Self {
        Self {
            index,
            mix_id: if index == FINAL_MIX_ID as usize {
                FINAL_MIX_ID
            } else {
                UNUSED_MIX_ID
            },
            volume: 0.0,
            sample_rate: 0,
            buffer_count: 0,
            buffer_offset: 0,
            is_used: false,
            node_id: 0,
            destination_mix: None,
            destination_splitter: None,
            distance_from_final_mix: None,
            effect_order: vec![None; effect_capacity].into_boxed_slice(),
            volumes: Box::default(),
        }
    }

    /// Slot index; also the mix's node in the edge matrix.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw mix id as last sent by the guest.
    pub fn mix_id(&self) -> i32 {
        self.mix_id
    }

    /// Whether this is the final mix.
    pub fn is_final(&self) -> bool {
        self.index == FINAL_MIX_ID as usize
    }

    /// Output gain.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of mix buffers owned.
    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    /// First mix buffer owned.
    pub fn buffer_offset(&self) -> u32 {
        self.buffer_offset
    }

    /// Whether the mix is active.
    pub fn is_used(&self) -> bool {
        self.is_used
    }

    /// Diagnostics correlation id.
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Direct destination.
    pub fn destination_mix(&self) -> Option<usize> {
        self.destination_mix
    }

    /// Splitter destination.
    pub fn destination_splitter(&self) -> Option<usize> {
        self.destination_splitter
    }

    /// Hops to the final mix, `None` when unreachable or not yet computed.
    pub fn distance_from_final_mix(&self) -> Option<u32> {
        self.distance_from_final_mix
    }

    /// Gain matrix.
    pub fn volumes(&self) -> &MixVolumeMatrix {
        &self.volumes
    }

    /// Whether the mix routes anywhere. False for the final mix and for
    /// dangling mixes.
    pub fn has_any_destination(&self) -> bool {
        self.destination_mix.is_some() || self.destination_splitter.is_some()
    }

    /// Effect chain slots; `Some(i)` is an index into the effect context.
    pub fn effect_order(&self) -> &[Option<usize>] {
        &self.effect_order
    }

    /// Effect indices in processing order, stopping at the first empty slot.
    pub fn ordered_effects(&self) -> impl Iterator<Item = usize> + '_ {
        self.effect_order.iter().map_while(|slot| *slot)
    }

    /// Empties the effect chain.
    pub fn clear_effect_processing_order(&mut self) {
        self.effect_order.fill(None);
    }

    fn disconnect(&mut self, edges: &mut EdgeMatrix) {
        edges.remove_edges(self.index);
        self.destination_mix = None;
        self.destination_splitter = None;
        self.clear_effect_processing_order();
    }

    /// Applies one frame's parameters and returns whether the mix's
    /// connectivity changed.
    pub fn update(
        &mut self,
        edges: &mut EdgeMatrix,
        parameter: &MixParameter,
        effects: &EffectContext,
        splitters: &SplitterContext,
        behaviour: &BehaviourContext,
    ) -> bool {
        self.volume = parameter.volume;
        self.sample_rate = parameter.sample_rate;
        self.buffer_count = parameter.buffer_count;
        self.is_used = parameter.is_used;
        self.mix_id = parameter.mix_id;
        self.node_id = parameter.node_id;
        *self.volumes = *parameter.volumes;

        let dirty = if behaviour.is_splitter_supported() {
            self.update_connection(edges, parameter, splitters)
        } else {
            let destination = mix_index(parameter.destination_mix_id);
            let changed = self.destination_mix != destination;
            if changed {
                edges.remove_edges(self.index);
                if let Some(to) = destination {
                    edges.connect(self.index, to);
                }
                self.destination_mix = destination;
            }
            self.destination_splitter = None;
            changed
        };

        self.rebuild_effect_order(effects);
        dirty
    }

    /// Re-resolves the outgoing edge when the route or the routed splitter
    /// changed.
    ///
    /// A direct destination wins over a splitter when both are given. A
    /// splitter route resolves to the splitter's first destination that names
    /// a mix.
    pub fn update_connection(
        &mut self,
        edges: &mut EdgeMatrix,
        parameter: &MixParameter,
        splitters: &SplitterContext,
    ) -> bool {
        let destination_mix = mix_index(parameter.destination_mix_id);
        let destination_splitter = splitter_index(parameter.destination_splitter_id);

        let splitter_changed = self
            .destination_splitter
            .is_some_and(|id| splitters.has_new_connection(id));

        if self.destination_mix == destination_mix
            && self.destination_splitter == destination_splitter
            && !splitter_changed
        {
            return false;
        }

        edges.remove_edges(self.index);
        let target = match (destination_mix, destination_splitter) {
            (Some(to), _) => Some(to),
            (None, Some(splitter)) => splitters.first_live_destination(splitter),
            (None, None) => None,
        };
        if let Some(to) = target {
            edges.connect(self.index, to);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(mix = self.index, ?target, "mix connection updated");

        self.destination_mix = destination_mix;
        self.destination_splitter = destination_splitter;
        true
    }

    fn rebuild_effect_order(&mut self, effects: &EffectContext) {
        self.clear_effect_processing_order();

        for (index, effect) in effects.iter().enumerate() {
            if effect.mix_id() != self.mix_id || effect.processing_order() < 0 {
                continue;
            }
            let slot = effect.processing_order() as usize;
            if slot >= self.effect_order.len() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    mix = self.index,
                    effect = index,
                    order = slot,
                    capacity = self.effect_order.len(),
                    "effect processing order out of range, chain truncated"
                );
                return;
            }
            self.effect_order[slot] = Some(index);
        }
    }
}

/// All mixes of a renderer plus the routing graph between them.
#[derive(Clone, Debug)]
pub struct MixContext {
    mixes: Vec<Mix>,
    edges: EdgeMatrix,
    ordering: CommandOrdering,
    sorted: Vec<usize>,
    mix_buffer_count: u32,
}

impl MixContext {
    /// Allocates `mix_count` mixes (slot 0 is the final mix) sharing
    /// `mix_buffer_count` mix buffers, each with an effect chain of
    /// `effect_capacity` slots.
    pub fn new(mix_count: usize, effect_capacity: usize, mix_buffer_count: u32) -> Self {
        Self {
            mixes: (0..mix_count)
                .map(|index| Mix::new(index, effect_capacity))
                .collect(),
            edges: EdgeMatrix::new(mix_count),
            ordering: CommandOrdering::new(mix_count),
            sorted: Vec::with_capacity(mix_count),
            mix_buffer_count,
        }
    }

    /// Number of mix slots.
    pub fn len(&self) -> usize {
        self.mixes.len()
    }

    /// Whether there are no mix slots.
    pub fn is_empty(&self) -> bool {
        self.mixes.is_empty()
    }

    /// Mix slot `index`.
    pub fn get(&self, index: usize) -> Option<&Mix> {
        self.mixes.get(index)
    }

    /// The final mix.
    pub fn final_mix(&self) -> Option<&Mix> {
        self.mixes.first()
    }

    /// All mix slots.
    pub fn iter(&self) -> std::slice::Iter<'_, Mix> {
        self.mixes.iter()
    }

    /// The routing graph.
    pub fn edges(&self) -> &EdgeMatrix {
        &self.edges
    }

    /// Used mixes in processing order, sources first.
    pub fn sorted(&self) -> &[usize] {
        &self.sorted
    }

    /// Mix buffers shared by all mixes.
    pub fn mix_buffer_count(&self) -> u32 {
        self.mix_buffer_count
    }

    /// Rejects parameter lists that would corrupt the graph, before any mix
    /// is touched.
    pub fn check_parameters(&self, parameters: &[MixParameter], dirty_only: bool) -> Result<()> {
        let count = self.mixes.len();

        if (dirty_only && parameters.len() > count) || (!dirty_only && parameters.len() != count)
        {
            return Err(UpdateError::ParameterCount {
                kind: "mix",
                expected: count,
                given: parameters.len(),
            });
        }

        let mut required: u32 = 0;
        for parameter in parameters {
            if dirty_only && mix_index(parameter.mix_id).is_none_or(|index| index >= count) {
                return Err(UpdateError::MixIdOutOfRange(parameter.mix_id));
            }
            if !parameter.is_used {
                continue;
            }
            if parameter.mix_id != FINAL_MIX_ID
                && let Some(destination) = mix_index(parameter.destination_mix_id)
                && destination >= count
            {
                return Err(UpdateError::InvalidDestination {
                    mix: parameter.mix_id,
                    destination: parameter.destination_mix_id,
                });
            }
            required = required.saturating_add(parameter.buffer_count);
        }

        if required > self.mix_buffer_count {
            return Err(UpdateError::MixBufferOverflow {
                required,
                available: self.mix_buffer_count,
            });
        }
        Ok(())
    }

    /// Applies one frame's mix parameters and re-sorts when connectivity
    /// changed. Returns whether a re-sort happened.
    ///
    /// With dirty-only updates each parameter names its slot through
    /// `mix_id`; otherwise there is exactly one parameter per slot.
    pub fn update(
        &mut self,
        parameters: &[MixParameter],
        effects: &EffectContext,
        splitters: &SplitterContext,
        behaviour: &BehaviourContext,
    ) -> Result<bool> {
        let dirty_only = behaviour.is_mix_in_parameter_dirty_only_update_supported();
        self.check_parameters(parameters, dirty_only)?;

        let mut dirty = false;
        for (slot, parameter) in parameters.iter().enumerate() {
            let index = if dirty_only {
                mix_index(parameter.mix_id).unwrap_or(slot)
            } else {
                slot
            };
            let mix = &mut self.mixes[index];

            if parameter.is_used != mix.is_used {
                mix.is_used = parameter.is_used;
                if parameter.is_used {
                    mix.clear_effect_processing_order();
                } else {
                    mix.disconnect(&mut self.edges);
                }
                dirty = true;
            }

            if mix.is_used {
                dirty |= mix.update(&mut self.edges, parameter, effects, splitters, behaviour);
            }
        }

        self.assign_buffer_offsets();

        if dirty {
            if behaviour.is_splitter_supported() && splitters.is_using_splitter() {
                self.sort_by_edges()?;
            } else {
                self.sort_by_distance()?;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(order = ?self.sorted, "mix graph re-sorted");
        }
        Ok(dirty)
    }

    fn assign_buffer_offsets(&mut self) {
        let mut offset = 0u32;
        for mix in self.mixes.iter_mut().filter(|m| m.is_used) {
            mix.buffer_offset = offset;
            offset = offset.saturating_add(mix.buffer_count);
        }
    }

    fn distance_of(&self, start: usize, known: &[Option<u32>]) -> Option<u32> {
        if start == FINAL_MIX_ID as usize {
            return Some(0);
        }
        let mut current = start;
        let mut hops = 0u32;
        for _ in 0..self.mixes.len() {
            let next = self.edges.outgoing(current).next()?;
            hops += 1;
            if next == FINAL_MIX_ID as usize {
                return Some(hops);
            }
            if let Some(distance) = known[next] {
                return Some(distance + hops);
            }
            current = next;
        }
        None
    }

    /// Recomputes every used mix's hop count to the final mix. Walks are
    /// bounded by the mix count, so a routing loop yields `None`.
    pub fn update_distances_from_final_mix(&mut self) {
        let mut distances = vec![None; self.mixes.len()];
        for index in 0..self.mixes.len() {
            if self.mixes[index].is_used {
                distances[index] = self.distance_of(index, &distances);
            }
        }
        for (mix, distance) in self.mixes.iter_mut().zip(distances) {
            mix.distance_from_final_mix = distance;
        }
    }

    /// Orders used mixes by descending distance from the final mix;
    /// unreachable mixes go last. A routing loop fails the sort.
    pub fn sort_by_distance(&mut self) -> Result<()> {
        self.update_distances_from_final_mix();
        self.sorted.clear();
        self.ordering.sort(&self.edges)?;
        self.sorted
            .extend(self.mixes.iter().filter(|m| m.is_used).map(|m| m.index));
        let mixes = &self.mixes;
        self.sorted.sort_by_key(|&index| {
            std::cmp::Reverse(
                mixes[index]
                    .distance_from_final_mix
                    .map_or(-1, i64::from),
            )
        });
        Ok(())
    }

    /// Orders used mixes topologically through the edge matrix.
    pub fn sort_by_edges(&mut self) -> Result<()> {
        self.update_distances_from_final_mix();
        self.sorted.clear();
        let order = self.ordering.sort(&self.edges)?;
        let mixes = &self.mixes;
        self.sorted
            .extend(order.iter().copied().filter(|&index| mixes[index].is_used));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::LAST_REVISION;
    use crate::effect::{EffectParameter, EffectParams, ReverbParams};
    use crate::graph::GraphError;
    use crate::memory::{BufferDescriptor, PoolMapper};
    use crate::splitter::{SplitterDestinationParameter, SplitterParameter};

    fn behaviour() -> BehaviourContext {
        BehaviourContext::new(LAST_REVISION)
    }

    fn star(count: usize) -> Vec<MixParameter> {
        (0..count as i32)
            .map(|id| {
                let parameter = MixParameter::new(id);
                if id == FINAL_MIX_ID {
                    parameter
                } else {
                    parameter.with_destination(FINAL_MIX_ID)
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Mix::update
    // ------------------------------------------------------------------

    #[test]
    fn star_topology_has_one_edge_per_sub_mix_and_is_idempotent() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(0, 0);
        let mut edges = EdgeMatrix::new(6);
        let mut mixes: Vec<Mix> = (0..6).map(|i| Mix::new(i, 4)).collect();
        let parameters = star(6);

        for &i in &[3usize, 0, 5, 1, 4, 2] {
            mixes[i].update(&mut edges, &parameters[i], &effects, &splitters, &behaviour);
        }
        assert_eq!(edges.edge_count(), 5);
        for from in 1..6 {
            assert_eq!(edges.outgoing(from).collect::<Vec<_>>(), vec![0]);
        }
        assert_eq!(edges.outgoing(0).count(), 0);
        assert!(!mixes[0].has_any_destination());

        let dirty = (0..6)
            .filter(|&i| {
                mixes[i].update(&mut edges, &parameters[i], &effects, &splitters, &behaviour)
            })
            .count();
        assert_eq!(dirty, 0);
        assert_eq!(edges.edge_count(), 5);
    }

    #[test]
    fn splitter_route_connects_first_destination_only() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let mut splitters = SplitterContext::new(1, 2);
        splitters.update(
            &[SplitterParameter {
                id: 0,
                sample_rate: 48_000,
                destination_ids: vec![0, 1],
            }],
            &[
                SplitterDestinationParameter::new(0, 1),
                SplitterDestinationParameter::new(1, 2),
            ],
            &behaviour,
        );

        let mut edges = EdgeMatrix::new(4);
        let mut x = Mix::new(3, 0);
        let parameter = MixParameter::new(3).with_splitter(0);

        assert!(x.update(&mut edges, &parameter, &effects, &splitters, &behaviour));
        assert!(edges.connected(3, 1));
        assert!(!edges.connected(3, 2));
        assert_eq!(edges.edge_count(), 1);

        // Splitter flag is still raised from its update: recompute.
        assert!(x.update(&mut edges, &parameter, &effects, &splitters, &behaviour));

        splitters.clear_all_new_connection_flags();
        assert!(!x.update(&mut edges, &parameter, &effects, &splitters, &behaviour));

        splitters.mark_new_connection(0);
        assert!(x.update(&mut edges, &parameter, &effects, &splitters, &behaviour));
        assert_eq!(edges.edge_count(), 1);
    }

    #[test]
    fn rerouting_replaces_the_single_edge() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(0, 0);
        let mut edges = EdgeMatrix::new(4);
        let mut mix = Mix::new(3, 0);

        let route = |mix: &mut Mix, edges: &mut EdgeMatrix, parameter: MixParameter| {
            mix.update(edges, &parameter, &effects, &splitters, &behaviour)
        };

        route(&mut mix, &mut edges, MixParameter::new(3).with_destination(2));
        assert!(edges.connected(3, 2));
        assert!(route(&mut mix, &mut edges, MixParameter::new(3).with_destination(1)));
        assert!(!edges.connected(3, 2));
        assert!(edges.connected(3, 1));
        assert!(route(&mut mix, &mut edges, MixParameter::new(3)));
        assert_eq!(edges.edge_count(), 0);
        assert!(!mix.has_any_destination());
    }

    #[test]
    fn without_splitter_support_destination_comparison_only() {
        let behaviour = BehaviourContext::new(1);
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(1, 1);
        let mut edges = EdgeMatrix::new(3);
        let mut mix = Mix::new(2, 0);

        let parameter = MixParameter::new(2).with_destination(1).with_splitter(0);
        assert!(mix.update(&mut edges, &parameter, &effects, &splitters, &behaviour));
        assert_eq!(mix.destination_splitter(), None);
        assert_eq!(mix.destination_mix(), Some(1));
        assert!(!mix.update(&mut edges, &parameter, &effects, &splitters, &behaviour));
    }

    fn reverb(mix_id: i32, processing_order: i32) -> EffectParameter {
        EffectParameter {
            mix_id,
            processing_order,
            work_buffer: BufferDescriptor::new(0x1000, 0x100),
            ..EffectParameter::new(EffectParams::Reverb(ReverbParams::default()))
        }
    }

    fn effect_context(parameters: &[EffectParameter]) -> EffectContext {
        let mut mapper = PoolMapper::new();
        mapper.register(0x1000, 0x1000, 0x1000);
        let mut behaviour = behaviour();
        let mut effects = EffectContext::new(parameters.len());
        effects
            .update(parameters, &mut mapper, &mut behaviour, false)
            .expect("count matches");
        effects
    }

    #[test]
    fn effect_order_places_indices_by_processing_order() {
        let effects = effect_context(&[reverb(1, 2), reverb(2, 0), reverb(1, 0), reverb(1, -1)]);
        let behaviour = behaviour();
        let splitters = SplitterContext::new(0, 0);
        let mut edges = EdgeMatrix::new(3);
        let mut mix = Mix::new(1, 4);

        mix.update(&mut edges, &MixParameter::new(1), &effects, &splitters, &behaviour);
        assert_eq!(mix.effect_order(), &[Some(2), None, Some(0), None]);
        assert_eq!(mix.ordered_effects().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn out_of_capacity_order_truncates_rebuild() {
        let effects = effect_context(&[reverb(1, 0), reverb(1, 2), reverb(1, 1)]);
        let behaviour = behaviour();
        let splitters = SplitterContext::new(0, 0);
        let mut edges = EdgeMatrix::new(2);
        let mut mix = Mix::new(1, 2);

        let dirty = mix.update(
            &mut edges,
            &MixParameter::new(1).with_destination(0),
            &effects,
            &splitters,
            &behaviour,
        );
        assert!(dirty);
        assert_eq!(mix.effect_order(), &[Some(0), None]);
    }

    // ------------------------------------------------------------------
    // MixContext
    // ------------------------------------------------------------------

    #[test]
    fn context_sorts_chain_sources_first() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(1, 1);
        let mut context = MixContext::new(4, 0, 24);

        let parameters = vec![
            MixParameter::new(0),
            MixParameter::new(1).with_destination(0),
            MixParameter::new(2).with_destination(1),
            MixParameter::new(3).with_destination(2),
        ];
        assert!(context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect("valid"));
        assert_eq!(context.sorted(), &[3, 2, 1, 0]);
        assert_eq!(
            context.get(3).and_then(Mix::distance_from_final_mix),
            Some(3)
        );
        assert_eq!(context.get(2).map(Mix::buffer_offset), Some(2));

        assert!(!context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect("valid"));
    }

    #[test]
    fn distance_sort_without_splitters() {
        let behaviour = BehaviourContext::new(1);
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(0, 0);
        let mut context = MixContext::new(5, 0, 24);

        let mut parameters = vec![
            MixParameter::new(0),
            MixParameter::new(1).with_destination(0),
            MixParameter::new(2).with_destination(1),
            MixParameter::new(3),
            MixParameter::new(4).with_destination(2),
        ];
        parameters[3].buffer_count = 2;
        context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect("valid");
        assert_eq!(context.sorted(), &[4, 2, 1, 0, 3]);
        assert_eq!(context.get(3).and_then(Mix::distance_from_final_mix), None);
    }

    #[test]
    fn cycle_fails_sorting() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(1, 1);
        let mut context = MixContext::new(4, 0, 24);

        let parameters = vec![
            MixParameter::new(0),
            MixParameter::new(1).with_destination(2),
            MixParameter::new(2).with_destination(3),
            MixParameter::new(3).with_destination(1),
        ];
        let err = context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect_err("cycle");
        assert!(matches!(
            err,
            UpdateError::InvalidMixSorting(GraphError::CycleDetected { .. })
        ));
        assert!(context.sorted().is_empty());
        assert_eq!(context.get(1).and_then(Mix::distance_from_final_mix), None);
    }

    #[test]
    fn cycle_fails_distance_sort_without_splitters() {
        let behaviour = BehaviourContext::new(1);
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(0, 0);
        let mut context = MixContext::new(3, 0, 24);

        let parameters = vec![
            MixParameter::new(0),
            MixParameter::new(1).with_destination(2),
            MixParameter::new(2).with_destination(1),
        ];
        let err = context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect_err("cycle");
        assert!(matches!(
            err,
            UpdateError::InvalidMixSorting(GraphError::CycleDetected { .. })
        ));
        assert!(context.sorted().is_empty());

        // Breaking the loop sorts again.
        let parameters = vec![
            MixParameter::new(0),
            MixParameter::new(1).with_destination(2),
            MixParameter::new(2).with_destination(0),
        ];
        context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect("acyclic");
        assert_eq!(context.sorted(), &[1, 2, 0]);
    }

    #[test]
    fn validation_rejects_before_mutation() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(0, 0);
        let mut context = MixContext::new(3, 0, 2);

        let mut parameters = star(3);
        parameters[1].buffer_count = 2;
        let err = context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect_err("too many buffers");
        assert_eq!(
            err,
            UpdateError::MixBufferOverflow {
                required: 4,
                available: 2
            }
        );
        assert!(context.iter().all(|m| !m.is_used()));

        let parameters = vec![
            MixParameter::new(0),
            MixParameter::new(1).with_destination(7),
        ];
        let err = context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect_err("destination out of range");
        assert!(matches!(err, UpdateError::InvalidDestination { mix: 1, destination: 7 }));
        assert_eq!(context.edges().edge_count(), 0);
    }

    #[test]
    fn dirty_only_update_targets_named_mix() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(0, 0);
        let mut context = MixContext::new(4, 0, 24);

        context
            .update(
                &[MixParameter::new(0), MixParameter::new(2).with_destination(0)],
                &effects,
                &splitters,
                &behaviour,
            )
            .expect("valid");
        assert!(context.get(2).is_some_and(Mix::is_used));
        assert!(context.get(1).is_some_and(|m| !m.is_used()));
        assert!(context.edges().connected(2, 0));

        let err = context
            .update(&[MixParameter::new(9)], &effects, &splitters, &behaviour)
            .expect_err("out of range");
        assert_eq!(err, UpdateError::MixIdOutOfRange(9));
    }

    #[test]
    fn deactivated_mix_drops_its_edge() {
        let behaviour = behaviour();
        let effects = EffectContext::new(0);
        let splitters = SplitterContext::new(0, 0);
        let mut context = MixContext::new(2, 0, 24);

        let mut parameters = star(2);
        context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect("valid");
        assert_eq!(context.edges().edge_count(), 1);

        parameters[1].is_used = false;
        assert!(context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect("valid"));
        assert_eq!(context.edges().edge_count(), 0);
        assert_eq!(context.sorted(), &[0]);

        parameters[1].is_used = true;
        context
            .update(&parameters, &effects, &splitters, &behaviour)
            .expect("valid");
        assert!(context.edges().connected(1, 0));
    }
}
