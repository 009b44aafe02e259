//! Instanced placement of many features over a few model variants.
//!
//! Features are dealt round-robin over the variant groups: feature `i` goes
//! to group `i % groups` at instance slot `i / groups`. A layer configured
//! with instance variants draws each tile as one [`InstanceBatch`] per
//! variant instead of placing a model copy per feature.

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use tilemodels_decode::Placement;

use crate::{assemble::placement_scale_unit, types::TileId};

/// How the features left over after an even split are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// The remainder is taken modulo the feature count itself, which is
    /// always zero. Every group gets `features / groups` slots and the
    /// leftover features get none.
    #[default]
    SelfModulo,
    /// The first `features % groups` groups get one extra slot each, so
    /// every feature has a slot.
    Spread,
}

/// Instance count per group for `features` features over `groups` groups.
#[must_use]
pub fn distribute(features: usize, groups: usize, policy: RemainderPolicy) -> Vec<usize> {
    if groups == 0 {
        return Vec::new();
    }
    let quotient = features / groups;
    let remainder = match policy {
        RemainderPolicy::SelfModulo => 0,
        RemainderPolicy::Spread => features % groups,
    };
    (0..groups)
        .map(|group| quotient + usize::from(group < remainder))
        .collect()
}

/// Group and instance slot of feature `index`.
#[must_use]
pub fn slot(index: usize, groups: usize) -> Option<(usize, usize)> {
    (groups > 0).then(|| (index % groups, index / groups))
}

/// Whether feature `index` fits the slots handed out by `counts`.
#[must_use]
pub fn has_slot(index: usize, counts: &[usize]) -> bool {
    slot(index, counts.len()).is_some_and(|(group, instance)| instance < counts[group])
}

/// Per-instance matrix of a feature at tile-local `(x, y)` with
/// scale-correction factor `scale_unit`.
#[must_use]
pub fn instance_matrix(x: f64, y: f64, scale_unit: f64) -> DMat4 {
    DMat4::from_scale_rotation_translation(
        DVec3::new(scale_unit, -scale_unit, 1.0),
        DQuat::IDENTITY,
        DVec3::new(x, y, 0.0),
    )
}

/// The instances of one model variant in one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceBatch {
    pub model_name: String,
    /// Tile-space matrix per instance, in slot order.
    pub matrices: Vec<DMat4>,
    /// Scale-correction factor per instance, for the planar shadow pass.
    pub scale_units: Vec<f64>,
}

impl InstanceBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }
}

/// Deal the placements of `tile` over `variants`, one batch per variant.
///
/// Placements without a slot under `policy` are left out.
#[must_use]
pub fn batch_placements(
    tile: TileId,
    placements: &[Placement],
    variants: &[String],
    policy: RemainderPolicy,
) -> Vec<InstanceBatch> {
    let counts = distribute(placements.len(), variants.len(), policy);
    let mut batches: Vec<InstanceBatch> = variants
        .iter()
        .zip(&counts)
        .map(|(name, &count)| InstanceBatch {
            model_name: name.clone(),
            matrices: Vec::with_capacity(count),
            scale_units: Vec::with_capacity(count),
        })
        .collect();

    for (index, placement) in placements.iter().enumerate() {
        if !has_slot(index, &counts) {
            continue;
        }
        let Some((group, _)) = slot(index, batches.len()) else {
            continue;
        };
        let scale_unit = placement_scale_unit(tile, placement);
        let batch = &mut batches[group];
        batch
            .matrices
            .push(instance_matrix(placement.x, placement.y, scale_unit));
        batch.scale_units.push(scale_unit);
    }

    let dropped = placements.len() - batches.iter().map(InstanceBatch::len).sum::<usize>();
    if dropped > 0 {
        tracing::debug!(%tile, dropped, ?policy, "placements without an instance slot");
    }
    batches
}
