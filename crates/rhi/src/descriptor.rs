//! Descriptor layouts, pools and per-frame descriptor sets.
//!
//! - [`DescriptorSetLayoutBuilder`] accumulates bindings, then creates an
//!   immutable [`DescriptorSetLayout`]
//! - [`DescriptorPoolBuilder`] accumulates capacity, then creates a
//!   [`DescriptorPool`]
//! - [`DescriptorSet`] holds one `VkDescriptorSet` per frame in flight and
//!   stages writes per slot (or for every slot) until they are flushed
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use umbra_rhi::device::Device;
//! use umbra_rhi::descriptor::{
//!     DescriptorPoolBuilder, DescriptorSet, DescriptorSetLayout, WriteTarget,
//! };
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     ubo: vk::DescriptorBufferInfo,
//! # ) -> Result<(), umbra_rhi::RhiError> {
//! let layout = DescriptorSetLayout::builder()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
//!     .create(device.clone())?;
//! let pool = DescriptorPoolBuilder::new()
//!     .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .create(device.clone(), 2)?;
//!
//! let mut set = DescriptorSet::new(device, &layout, &pool)?;
//! set.add_buffer_write(WriteTarget::All, 0, ubo)?;
//! set.update_all()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

// =============================================================================
// Layout
// =============================================================================

/// One declared binding of a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
}

/// Accumulates bindings for a [`DescriptorSetLayout`].
#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        self.bindings.push(LayoutBinding {
            binding,
            ty,
            stages,
            count,
        });
        self
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    /// Rejects duplicate binding indices and zero-sized arrays.
    pub fn validate(&self) -> RhiResult<()> {
        let mut seen = BTreeSet::new();
        for b in &self.bindings {
            if b.count == 0 {
                return Err(RhiError::DescriptorError(format!(
                    "binding {} has a descriptor count of 0",
                    b.binding
                )));
            }
            if !seen.insert(b.binding) {
                return Err(RhiError::DescriptorError(format!(
                    "binding {} declared twice",
                    b.binding
                )));
            }
        }
        Ok(())
    }

    pub fn create(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        self.validate()?;

        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding<'_>> = self
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.ty)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            self.bindings.len()
        );

        Ok(DescriptorSetLayout {
            device,
            layout,
            bindings: self.bindings,
        })
    }
}

/// Immutable descriptor set layout.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::new()
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Accumulates per-type capacity for a [`DescriptorPool`]. Repeated types
/// are summed.
#[derive(Clone, Debug, Default)]
pub struct DescriptorPoolBuilder {
    sizes: Vec<(vk::DescriptorType, u32)>,
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool_size(mut self, ty: vk::DescriptorType, count: u32) -> Self {
        match self.sizes.iter_mut().find(|(t, _)| *t == ty) {
            Some((_, total)) => *total += count,
            None => self.sizes.push((ty, count)),
        }
        self
    }

    /// Capacity for one set of `layout`, times `sets`.
    pub fn add_layout(mut self, layout: &[LayoutBinding], sets: u32) -> Self {
        for b in layout {
            self = self.add_pool_size(b.ty, b.count * sets);
        }
        self
    }

    pub fn sizes(&self) -> &[(vk::DescriptorType, u32)] {
        &self.sizes
    }

    pub fn create(self, device: Arc<Device>, max_sets: u32) -> RhiResult<DescriptorPool> {
        if self.sizes.is_empty() || max_sets == 0 {
            return Err(RhiError::DescriptorError(
                "descriptor pool needs at least one size and one set".to_string(),
            ));
        }

        let pool_sizes: Vec<vk::DescriptorPoolSize> = self
            .sizes
            .iter()
            .map(|&(ty, count)| {
                vk::DescriptorPoolSize::default()
                    .ty(ty)
                    .descriptor_count(count)
            })
            .collect();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(DescriptorPool {
            device,
            pool,
            max_sets,
        })
    }
}

/// Descriptor pool. Sets allocated from it are released when it drops.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        debug!("Allocated {} descriptor set(s)", sets.len());
        Ok(sets)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

// =============================================================================
// Staged writes
// =============================================================================

/// Which frame slot(s) a staged write applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteTarget {
    Slot(usize),
    All,
}

#[derive(Clone, Copy, Debug)]
pub enum WriteResource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Clone, Copy, Debug)]
pub struct StagedWrite {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub resource: WriteResource,
}

/// Pending writes per frame slot, checked against the layout.
///
/// A second write to the same binding of the same slot replaces the first,
/// so a slot never holds more writes than the layout has bindings.
#[derive(Clone, Debug)]
pub struct WriteStaging {
    layout: Vec<LayoutBinding>,
    pending: Vec<Vec<StagedWrite>>,
    written: Vec<BTreeSet<u32>>,
}

impl WriteStaging {
    pub fn new(layout: &[LayoutBinding], slot_count: usize) -> Self {
        Self {
            layout: layout.to_vec(),
            pending: vec![Vec::new(); slot_count],
            written: vec![BTreeSet::new(); slot_count],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.pending.len()
    }

    pub fn binding_count(&self) -> usize {
        self.layout.len()
    }

    /// Stages `resource` for `binding` in the targeted slot(s).
    ///
    /// # Errors
    ///
    /// Fails if the slot is out of range, the binding is not in the layout,
    /// or the resource kind does not match the binding's descriptor type.
    pub fn stage(
        &mut self,
        target: WriteTarget,
        binding: u32,
        resource: WriteResource,
    ) -> RhiResult<()> {
        let declared = self
            .layout
            .iter()
            .find(|b| b.binding == binding)
            .ok_or_else(|| {
                RhiError::DescriptorError(format!("binding {binding} is not in the layout"))
            })?;

        if is_buffer_type(declared.ty) != matches!(resource, WriteResource::Buffer(_)) {
            return Err(RhiError::DescriptorError(format!(
                "binding {binding} is {:?}, got the wrong resource kind",
                declared.ty
            )));
        }

        let write = StagedWrite {
            binding,
            ty: declared.ty,
            resource,
        };

        let slots = match target {
            WriteTarget::All => 0..self.pending.len(),
            WriteTarget::Slot(i) if i < self.pending.len() => i..i + 1,
            WriteTarget::Slot(i) => {
                return Err(RhiError::DescriptorError(format!(
                    "frame slot {i} out of range (0..{})",
                    self.pending.len()
                )));
            }
        };

        for slot in slots {
            let pending = &mut self.pending[slot];
            match pending.iter_mut().find(|w| w.binding == binding) {
                Some(existing) => *existing = write,
                None => pending.push(write),
            }
        }
        Ok(())
    }

    pub fn staged_count(&self, slot: usize) -> usize {
        self.pending.get(slot).map_or(0, Vec::len)
    }

    /// Whether every layout binding of `slot` is written once the pending
    /// writes are flushed.
    pub fn is_complete(&self, slot: usize) -> bool {
        let (Some(pending), Some(written)) = (self.pending.get(slot), self.written.get(slot))
        else {
            return false;
        };
        self.layout.iter().all(|b| {
            written.contains(&b.binding) || pending.iter().any(|w| w.binding == b.binding)
        })
    }

    /// Removes and returns the writes pending for `slot`, recording their
    /// bindings as written.
    pub fn take(&mut self, slot: usize) -> RhiResult<Vec<StagedWrite>> {
        if slot >= self.pending.len() {
            return Err(RhiError::DescriptorError(format!(
                "frame slot {slot} out of range (0..{})",
                self.pending.len()
            )));
        }
        debug_assert!(
            self.is_complete(slot),
            "descriptor set slot {slot} flushed with {} of {} bindings written",
            self.staged_count(slot) + self.written[slot].len(),
            self.layout.len()
        );
        let writes = std::mem::take(&mut self.pending[slot]);
        self.written[slot].extend(writes.iter().map(|w| w.binding));
        Ok(writes)
    }
}

fn is_buffer_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

// =============================================================================
// Per-frame descriptor set
// =============================================================================

/// One descriptor set per frame slot, allocated from a single pool against a
/// single layout.
///
/// The set for slot `i` is only bound while recording slot `i`, so writing
/// it never races with the GPU reading another slot's set.
pub struct DescriptorSet {
    device: Arc<Device>,
    sets: Vec<vk::DescriptorSet>,
    staging: WriteStaging,
}

impl DescriptorSet {
    /// Allocates [`MAX_FRAMES_IN_FLIGHT`] sets.
    pub fn new(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        pool: &DescriptorPool,
    ) -> RhiResult<Self> {
        let layouts = [layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let sets = pool.allocate(&layouts)?;
        Ok(Self {
            device,
            sets,
            staging: WriteStaging::new(layout.bindings(), MAX_FRAMES_IN_FLIGHT),
        })
    }

    pub fn add_buffer_write(
        &mut self,
        target: WriteTarget,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) -> RhiResult<()> {
        self.staging
            .stage(target, binding, WriteResource::Buffer(info))
    }

    pub fn add_image_write(
        &mut self,
        target: WriteTarget,
        binding: u32,
        info: vk::DescriptorImageInfo,
    ) -> RhiResult<()> {
        self.staging
            .stage(target, binding, WriteResource::Image(info))
    }

    /// Flushes the writes staged for `slot`.
    ///
    /// Must not be called while the GPU may still be using that slot's set.
    pub fn update_by_idx(&mut self, slot: usize) -> RhiResult<()> {
        let staged = self.staging.take(slot)?;
        if staged.is_empty() {
            return Ok(());
        }

        let set = self.sets[slot];
        let writes: Vec<vk::WriteDescriptorSet<'_>> = staged
            .iter()
            .map(|w| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(w.binding)
                    .descriptor_type(w.ty);
                match &w.resource {
                    WriteResource::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    WriteResource::Image(info) => write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        unsafe { self.device.handle().update_descriptor_sets(&writes, &[]) };
        trace!("Flushed {} descriptor write(s) for slot {}", writes.len(), slot);
        Ok(())
    }

    pub fn update_all(&mut self) -> RhiResult<()> {
        for slot in 0..self.sets.len() {
            self.update_by_idx(slot)?;
        }
        Ok(())
    }

    /// Binds the set for `slot` at `set_index`.
    pub fn bind(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        slot: usize,
    ) {
        cmd.bind_descriptor_set(layout, set_index, self.sets[slot]);
    }

    #[inline]
    pub fn handle(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    pub fn staging(&self) -> &WriteStaging {
        &self.staging
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lighting_layout() -> DescriptorSetLayoutBuilder {
        let frag = vk::ShaderStageFlags::FRAGMENT;
        DescriptorSetLayout::builder()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, frag, 1)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, frag, 1)
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, frag, 1)
    }

    fn buffer() -> WriteResource {
        WriteResource::Buffer(vk::DescriptorBufferInfo::default().range(64))
    }

    fn image() -> WriteResource {
        WriteResource::Image(vk::DescriptorImageInfo::default())
    }

    #[test]
    fn test_layout_builder_accumulates_bindings() {
        let builder = lighting_layout();
        assert_eq!(builder.bindings().len(), 3);
        assert_eq!(builder.bindings()[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn test_layout_builder_rejects_duplicate_binding() {
        let builder = lighting_layout().add_binding(
            1,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
            1,
        );
        assert!(matches!(builder.validate(), Err(RhiError::DescriptorError(_))));
    }

    #[test]
    fn test_pool_builder_sums_repeated_types() {
        let builder = DescriptorPoolBuilder::new()
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
            .add_pool_size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 3);
        assert_eq!(
            builder.sizes(),
            &[
                (vk::DescriptorType::UNIFORM_BUFFER, 5),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4)
            ]
        );
    }

    #[test]
    fn test_pool_builder_from_layout() {
        let layout = lighting_layout();
        let builder = DescriptorPoolBuilder::new().add_layout(layout.bindings(), 2);
        assert_eq!(
            builder.sizes(),
            &[
                (vk::DescriptorType::UNIFORM_BUFFER, 2),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4)
            ]
        );
    }

    #[test]
    fn test_write_count_matches_binding_count() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 2);

        staging.stage(WriteTarget::All, 0, buffer()).unwrap();
        staging.stage(WriteTarget::All, 1, image()).unwrap();
        staging.stage(WriteTarget::Slot(0), 2, image()).unwrap();
        staging.stage(WriteTarget::Slot(1), 2, image()).unwrap();

        for slot in 0..2 {
            assert_eq!(staging.staged_count(slot), staging.binding_count());
            assert!(staging.is_complete(slot));
        }
    }

    #[test]
    fn test_rewrite_replaces_instead_of_adding() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 2);
        staging.stage(WriteTarget::All, 1, image()).unwrap();
        staging.stage(WriteTarget::Slot(0), 1, image()).unwrap();
        assert_eq!(staging.staged_count(0), 1);
        assert_eq!(staging.staged_count(1), 1);
    }

    #[test]
    fn test_slot_write_does_not_touch_other_slot() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 2);
        staging.stage(WriteTarget::Slot(1), 0, buffer()).unwrap();
        assert_eq!(staging.staged_count(0), 0);
        assert_eq!(staging.staged_count(1), 1);
    }

    #[test]
    fn test_incomplete_slot_detected() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 2);
        staging.stage(WriteTarget::All, 0, buffer()).unwrap();
        assert!(!staging.is_complete(0));
    }

    #[test]
    fn test_partial_rewrite_after_full_flush_is_complete() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 1);
        staging.stage(WriteTarget::All, 0, buffer()).unwrap();
        staging.stage(WriteTarget::All, 1, image()).unwrap();
        staging.stage(WriteTarget::All, 2, image()).unwrap();
        assert_eq!(staging.take(0).unwrap().len(), 3);

        staging.stage(WriteTarget::All, 2, image()).unwrap();
        assert!(staging.is_complete(0));
        assert_eq!(staging.take(0).unwrap().len(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "bindings written")]
    fn test_incomplete_flush_panics_in_debug() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 2);
        staging.stage(WriteTarget::All, 0, buffer()).unwrap();
        let _ = staging.take(0);
    }

    #[test]
    fn test_stage_rejects_unknown_binding_and_kind() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 2);
        assert!(staging.stage(WriteTarget::All, 7, buffer()).is_err());
        assert!(staging.stage(WriteTarget::All, 0, image()).is_err());
        assert!(staging.stage(WriteTarget::All, 1, buffer()).is_err());
    }

    #[test]
    fn test_stage_rejects_out_of_range_slot() {
        let layout = lighting_layout();
        let mut staging = WriteStaging::new(layout.bindings(), 2);
        assert!(matches!(
            staging.stage(WriteTarget::Slot(2), 0, buffer()),
            Err(RhiError::DescriptorError(_))
        ));
    }
}
