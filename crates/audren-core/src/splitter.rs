//! Fan-out nodes between mixes.
//!
//! Splitters and their destinations live in two flat arenas owned by
//! [`SplitterContext`]; a splitter refers to its destinations by arena index.
//! Every update clears all `has_new_connection` flags and then raises them for
//! the splitters the guest touched, so a mix routed through a splitter
//! recomputes its edge whenever the splitter changed, even if the mix's own
//! parameters did not.

use crate::behaviour::BehaviourContext;
use crate::constants::{MIX_BUFFER_COUNT_MAX, UNUSED_MIX_ID, mix_index};

/// One frame's parameters for a splitter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitterParameter {
    /// Splitter slot to update.
    pub id: u32,
    /// Sample rate of the routed signal.
    pub sample_rate: u32,
    /// Destination slots, in routing order.
    pub destination_ids: Vec<u32>,
}

/// One frame's parameters for a splitter destination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitterDestinationParameter {
    /// Destination slot to update.
    pub id: u32,
    /// Mix the destination feeds, or [`UNUSED_MIX_ID`].
    pub destination_mix_id: i32,
    /// Whether the destination is active.
    pub is_used: bool,
    /// Gain per mix buffer.
    pub volumes: [f32; MIX_BUFFER_COUNT_MAX],
}

impl SplitterDestinationParameter {
    /// A used destination feeding `destination_mix_id` at unit gain.
    pub fn new(id: u32, destination_mix_id: i32) -> Self {
        Self {
            id,
            destination_mix_id,
            is_used: true,
            volumes: [1.0; MIX_BUFFER_COUNT_MAX],
        }
    }
}

/// A splitter destination slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitterDestination {
    destination_mix_id: i32,
    is_used: bool,
    volumes: [f32; MIX_BUFFER_COUNT_MAX],
}

impl Default for SplitterDestination {
    fn default() -> Self {
        Self {
            destination_mix_id: UNUSED_MIX_ID,
            is_used: false,
            volumes: [0.0; MIX_BUFFER_COUNT_MAX],
        }
    }
}

impl SplitterDestination {
    /// Raw destination mix id.
    pub fn destination_mix_id(&self) -> i32 {
        self.destination_mix_id
    }

    /// Destination mix as an index, `None` for the unused sentinel.
    pub fn mix(&self) -> Option<usize> {
        mix_index(self.destination_mix_id)
    }

    /// Whether the guest marked the destination active.
    pub fn is_used(&self) -> bool {
        self.is_used
    }

    /// Gain per mix buffer.
    pub fn volumes(&self) -> &[f32; MIX_BUFFER_COUNT_MAX] {
        &self.volumes
    }
}

/// A splitter slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Splitter {
    sample_rate: u32,
    destinations: Vec<usize>,
    has_new_connection: bool,
}

impl Splitter {
    /// Sample rate of the routed signal.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Destination arena indices, in routing order.
    pub fn destinations(&self) -> &[usize] {
        &self.destinations
    }

    /// Whether the splitter changed since the last update began.
    pub fn has_new_connection(&self) -> bool {
        self.has_new_connection
    }
}

/// The renderer's preallocated splitters and destinations.
#[derive(Clone, Debug, Default)]
pub struct SplitterContext {
    splitters: Vec<Splitter>,
    destinations: Vec<SplitterDestination>,
}

impl SplitterContext {
    /// Allocates `splitter_count` splitters sharing `destination_count` destinations.
    pub fn new(splitter_count: usize, destination_count: usize) -> Self {
        Self {
            splitters: vec![Splitter::default(); splitter_count],
            destinations: vec![SplitterDestination::default(); destination_count],
        }
    }

    /// Whether splitter routing is available at all.
    pub fn is_using_splitter(&self) -> bool {
        !self.splitters.is_empty() && !self.destinations.is_empty()
    }

    /// Number of splitter slots.
    pub fn splitter_count(&self) -> usize {
        self.splitters.len()
    }

    /// Number of destination slots.
    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Splitter `id`.
    pub fn get(&self, id: usize) -> Option<&Splitter> {
        self.splitters.get(id)
    }

    /// Destination slot `index`.
    pub fn destination(&self, index: usize) -> Option<&SplitterDestination> {
        self.destinations.get(index)
    }

    /// Destinations of splitter `id`, in routing order.
    pub fn destinations_of(&self, id: usize) -> impl Iterator<Item = &SplitterDestination> + '_ {
        self.splitters
            .get(id)
            .map(|s| s.destinations.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&index| self.destinations.get(index))
    }

    /// The mix a route through splitter `id` resolves to: its first
    /// destination that names a mix.
    pub fn first_live_destination(&self, id: usize) -> Option<usize> {
        self.destinations_of(id).find_map(SplitterDestination::mix)
    }

    /// Whether splitter `id` changed this update. Unknown ids report `false`.
    pub fn has_new_connection(&self, id: usize) -> bool {
        self.splitters.get(id).is_some_and(|s| s.has_new_connection)
    }

    /// Flags splitter `id` as changed.
    pub fn mark_new_connection(&mut self, id: usize) {
        if let Some(splitter) = self.splitters.get_mut(id) {
            splitter.has_new_connection = true;
        }
    }

    /// Lowers every `has_new_connection` flag.
    pub fn clear_all_new_connection_flags(&mut self) {
        for splitter in &mut self.splitters {
            splitter.has_new_connection = false;
        }
    }

    fn destination_share(&self) -> usize {
        if self.splitters.is_empty() {
            0
        } else {
            self.destinations.len() / self.splitters.len()
        }
    }

    /// Applies one frame's splitter and destination parameters.
    ///
    /// Unknown ids are skipped. Before the splitter bug-fix revision a
    /// splitter may hold at most its even share of the destination arena.
    pub fn update(
        &mut self,
        splitters: &[SplitterParameter],
        destinations: &[SplitterDestinationParameter],
        behaviour: &BehaviourContext,
    ) {
        if !self.is_using_splitter() {
            return;
        }

        self.clear_all_new_connection_flags();

        let share = self.destination_share();
        let bug_fixed = behaviour.is_splitter_bug_fixed();
        let destination_count = self.destinations.len();

        for parameter in splitters {
            let Some(splitter) = self.splitters.get_mut(parameter.id as usize) else {
                #[cfg(feature = "tracing")]
                tracing::warn!(id = parameter.id, "splitter id out of range");
                continue;
            };

            let count = if bug_fixed {
                parameter.destination_ids.len()
            } else {
                parameter.destination_ids.len().min(share)
            };

            splitter.sample_rate = parameter.sample_rate;
            splitter.destinations.clear();
            splitter.destinations.extend(
                parameter.destination_ids[..count]
                    .iter()
                    .map(|&id| id as usize)
                    .filter(|&id| id < destination_count),
            );
            splitter.has_new_connection = true;
        }

        for parameter in destinations {
            let index = parameter.id as usize;
            let Some(destination) = self.destinations.get_mut(index) else {
                #[cfg(feature = "tracing")]
                tracing::warn!(id = parameter.id, "splitter destination id out of range");
                continue;
            };

            let retargeted = destination.destination_mix_id != parameter.destination_mix_id;
            destination.destination_mix_id = parameter.destination_mix_id;
            destination.is_used = parameter.is_used;
            destination.volumes = parameter.volumes;

            if retargeted {
                for splitter in &mut self.splitters {
                    if splitter.destinations.contains(&index) {
                        splitter.has_new_connection = true;
                    }
                }
            }
        }
    }
}
