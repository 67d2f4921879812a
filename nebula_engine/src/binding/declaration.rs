/// Binding declarations and the configuration-time validator
///
/// Application code describes its shader interface as a plain list of
/// `{set, binding, kind, stage_flags}` entries; the validator checks the
/// data-shape constraints at startup: no two entries may collide on a
/// (set, binding) pair with different kinds, duplicate entries that agree
/// merge their stage visibility, and set indices must be contiguous from
/// zero.

use crate::device::{BindingTableKind, ShaderStageFlags, TableLayoutEntry};
use crate::engine_bail_invalid;
use crate::error::Result;

/// Resource references plus kind for one binding (closed over six kinds)
///
/// Resources are referenced by their pool index; a referenced resource may
/// not be built yet, in which case the binding stays invalid until an
/// update after the build succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// Uniform buffer. `slot_offset` shifts which flight-slot allocation a
    /// consumer reads (`(slot + slot_offset) % N`); `dynamic` marks the
    /// binding as backed by a dynamic uniform block.
    UniformBuffer {
        buffer: usize,
        slot_offset: usize,
        dynamic: bool,
    },
    /// Storage buffer with the same slot-offset semantics
    StorageBuffer { buffer: usize, slot_offset: usize },
    /// Array of sampled images
    SampledImages { images: Vec<usize> },
    /// Array of standalone samplers
    Samplers { samplers: Vec<usize> },
    /// Array of combined image+sampler pairs; both lists must be equally
    /// long
    CombinedImageSamplers {
        images: Vec<usize>,
        samplers: Vec<usize>,
    },
    /// Array of storage images
    StorageImages { images: Vec<usize> },
}

impl BindingKind {
    /// Device-level table kind for this binding
    pub fn table_kind(&self) -> BindingTableKind {
        match self {
            BindingKind::UniformBuffer { dynamic: true, .. } => {
                BindingTableKind::DynamicUniformBuffer
            }
            BindingKind::UniformBuffer { .. } => BindingTableKind::UniformBuffer,
            BindingKind::StorageBuffer { .. } => BindingTableKind::StorageBuffer,
            BindingKind::SampledImages { .. } => BindingTableKind::SampledImage,
            BindingKind::Samplers { .. } => BindingTableKind::Sampler,
            BindingKind::CombinedImageSamplers { .. } => BindingTableKind::CombinedImageSampler,
            BindingKind::StorageImages { .. } => BindingTableKind::StorageImage,
        }
    }

    /// Number of descriptors at this binding
    pub fn count(&self) -> u32 {
        match self {
            BindingKind::UniformBuffer { .. } | BindingKind::StorageBuffer { .. } => 1,
            BindingKind::SampledImages { images } => images.len() as u32,
            BindingKind::Samplers { samplers } => samplers.len() as u32,
            BindingKind::CombinedImageSamplers { images, .. } => images.len() as u32,
            BindingKind::StorageImages { images } => images.len() as u32,
        }
    }

    /// True for dynamic-uniform-backed bindings
    pub fn is_dynamic(&self) -> bool {
        matches!(self, BindingKind::UniformBuffer { dynamic: true, .. })
    }
}

/// One entry of the declarative shader-interface list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDeclaration {
    /// Set index (`layout(set = N)` in GLSL)
    pub set: u32,
    /// Binding number within the set
    pub binding: u32,
    /// Shader stages that access the binding
    pub stages: ShaderStageFlags,
    /// Kind plus resource references
    pub kind: BindingKind,
}

impl BindingDeclaration {
    /// Device-level layout entry for this declaration
    pub fn layout_entry(&self) -> TableLayoutEntry {
        TableLayoutEntry {
            binding: self.binding,
            kind: self.kind.table_kind(),
            count: self.kind.count(),
            stages: self.stages,
        }
    }
}

/// Validate a declaration list and group it into per-set lists
///
/// Checks, in order:
/// - combined image+sampler lists are equally long and arrays are non-empty
/// - duplicate (set, binding) pairs agree on kind and resources
///   (their stage flags are merged) or are rejected
/// - set indices are contiguous from zero
/// - each set holds at most one dynamic-uniform-backed binding
///
/// Returns one declaration list per set, bindings sorted by number.
pub fn validate_declarations(
    declarations: &[BindingDeclaration],
) -> Result<Vec<Vec<BindingDeclaration>>> {
    if declarations.is_empty() {
        return Ok(Vec::new());
    }

    for decl in declarations {
        match &decl.kind {
            BindingKind::CombinedImageSamplers { images, samplers } => {
                if images.len() != samplers.len() {
                    engine_bail_invalid!(
                        "nebula::Binding",
                        "Combined binding (set {}, binding {}) has {} images but {} samplers",
                        decl.set,
                        decl.binding,
                        images.len(),
                        samplers.len()
                    );
                }
                if images.is_empty() {
                    engine_bail_invalid!(
                        "nebula::Binding",
                        "Combined binding (set {}, binding {}) is empty",
                        decl.set,
                        decl.binding
                    );
                }
            }
            BindingKind::SampledImages { images } | BindingKind::StorageImages { images } => {
                if images.is_empty() {
                    engine_bail_invalid!(
                        "nebula::Binding",
                        "Image binding (set {}, binding {}) is empty",
                        decl.set,
                        decl.binding
                    );
                }
            }
            BindingKind::Samplers { samplers } => {
                if samplers.is_empty() {
                    engine_bail_invalid!(
                        "nebula::Binding",
                        "Sampler binding (set {}, binding {}) is empty",
                        decl.set,
                        decl.binding
                    );
                }
            }
            BindingKind::UniformBuffer { .. } | BindingKind::StorageBuffer { .. } => {}
        }
    }

    // Merge duplicates; entries sharing (set, binding) must agree on
    // everything except stage visibility.
    let mut merged: Vec<BindingDeclaration> = Vec::new();
    for decl in declarations {
        match merged
            .iter_mut()
            .find(|m| m.set == decl.set && m.binding == decl.binding)
        {
            Some(existing) => {
                if existing.kind != decl.kind {
                    engine_bail_invalid!(
                        "nebula::Binding",
                        "Colliding declarations at (set {}, binding {})",
                        decl.set,
                        decl.binding
                    );
                }
                existing.stages |= decl.stages;
            }
            None => merged.push(decl.clone()),
        }
    }

    let set_count = merged.iter().map(|d| d.set).max().unwrap() as usize + 1;
    let mut sets: Vec<Vec<BindingDeclaration>> = vec![Vec::new(); set_count];
    for decl in merged {
        sets[decl.set as usize].push(decl);
    }

    for (index, set) in sets.iter_mut().enumerate() {
        if set.is_empty() {
            engine_bail_invalid!(
                "nebula::Binding",
                "Set indices must be contiguous from zero; set {} is empty",
                index
            );
        }
        set.sort_by_key(|d| d.binding);

        let dynamic_count = set.iter().filter(|d| d.kind.is_dynamic()).count();
        if dynamic_count > 1 {
            engine_bail_invalid!(
                "nebula::Binding",
                "Set {} declares {} dynamic uniform bindings (at most one allowed)",
                index,
                dynamic_count
            );
        }
    }

    Ok(sets)
}

#[cfg(test)]
#[path = "declaration_tests.rs"]
mod tests;
