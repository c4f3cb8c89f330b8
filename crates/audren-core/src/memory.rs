//! Guest buffer translation.
//!
//! Effects and sinks never dereference guest addresses. They hand a
//! [`BufferDescriptor`] to an [`AddressMapper`] and keep the returned
//! [`MappedRegion`] until they release it. [`PoolMapper`] is the concrete
//! mapper: guests register memory pools up front and every buffer must lie
//! inside one of them.

use crate::error::{ErrorCode, ErrorInfo};

/// A guest buffer as described by a parameter block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Guest address of the first byte.
    pub address: u64,
    /// Length in bytes.
    pub size: u64,
}

impl BufferDescriptor {
    /// Creates a descriptor.
    pub const fn new(address: u64, size: u64) -> Self {
        Self { address, size }
    }
}

/// A translated buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedRegion {
    /// Guest address the region was requested at.
    pub cpu_address: u64,
    /// Address the processing side uses for the same bytes.
    pub dsp_address: u64,
    /// Length in bytes.
    pub size: u64,
    /// Pool the region was resolved through, `None` for forced mappings.
    pub pool: Option<usize>,
}

/// Validates and translates guest buffers.
pub trait AddressMapper {
    /// Translates `buffer`, failing with an [`ErrorInfo`] the caller records
    /// against the entity that asked.
    fn attach(&mut self, buffer: BufferDescriptor) -> Result<MappedRegion, ErrorInfo>;

    /// Gives back a region obtained from [`attach`](Self::attach).
    fn release(&mut self, region: MappedRegion);

    /// When enabled, buffers outside every pool are mapped one-to-one instead
    /// of rejected. Mappers without pools may ignore it.
    fn set_force_mapping(&mut self, _enabled: bool) {}
}

/// A registered guest memory range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryPool {
    /// Guest base address.
    pub cpu_address: u64,
    /// Processing-side base address.
    pub dsp_address: u64,
    /// Length in bytes.
    pub size: u64,
    attachments: u32,
}

impl MemoryPool {
    fn contains(&self, address: u64, size: u64) -> bool {
        let Some(end) = address.checked_add(size) else {
            return false;
        };
        let Some(pool_end) = self.cpu_address.checked_add(self.size) else {
            return false;
        };
        address >= self.cpu_address && end <= pool_end
    }

    /// Regions currently attached through this pool.
    pub fn attachments(&self) -> u32 {
        self.attachments
    }
}

/// [`AddressMapper`] backed by a list of registered pools.
#[derive(Debug, Default, Clone)]
pub struct PoolMapper {
    pools: Vec<Option<MemoryPool>>,
    force_mapping: bool,
}

impl PoolMapper {
    /// Creates a mapper with no pools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool and returns its handle.
    pub fn register(&mut self, cpu_address: u64, dsp_address: u64, size: u64) -> usize {
        let pool = MemoryPool {
            cpu_address,
            dsp_address,
            size,
            attachments: 0,
        };
        if let Some(slot) = self.pools.iter().position(Option::is_none) {
            self.pools[slot] = Some(pool);
            slot
        } else {
            self.pools.push(Some(pool));
            self.pools.len() - 1
        }
    }

    /// Removes a pool. Fails while any region is still attached through it.
    pub fn unregister(&mut self, handle: usize) -> bool {
        match self.pools.get(handle) {
            Some(Some(pool)) if pool.attachments == 0 => {
                self.pools[handle] = None;
                true
            }
            _ => false,
        }
    }

    /// Looks up a pool by handle.
    pub fn pool(&self, handle: usize) -> Option<&MemoryPool> {
        self.pools.get(handle).and_then(Option::as_ref)
    }
}

impl AddressMapper for PoolMapper {
    fn attach(&mut self, buffer: BufferDescriptor) -> Result<MappedRegion, ErrorInfo> {
        if buffer.address != 0 {
            for (handle, slot) in self.pools.iter_mut().enumerate() {
                if let Some(pool) = slot
                    && pool.contains(buffer.address, buffer.size)
                {
                    pool.attachments += 1;
                    return Ok(MappedRegion {
                        cpu_address: buffer.address,
                        dsp_address: pool.dsp_address + (buffer.address - pool.cpu_address),
                        size: buffer.size,
                        pool: Some(handle),
                    });
                }
            }
        }

        if self.force_mapping && buffer.address != 0 {
            return Ok(MappedRegion {
                cpu_address: buffer.address,
                dsp_address: buffer.address,
                size: buffer.size,
                pool: None,
            });
        }

        Err(ErrorInfo::new(ErrorCode::InvalidAddressInfo, buffer.address))
    }

    fn release(&mut self, region: MappedRegion) {
        if let Some(handle) = region.pool
            && let Some(Some(pool)) = self.pools.get_mut(handle)
        {
            pool.attachments = pool.attachments.saturating_sub(1);
        }
    }

    fn set_force_mapping(&mut self, enabled: bool) {
        self.force_mapping = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PoolMapper {
        let mut mapper = PoolMapper::new();
        mapper.register(0x1000, 0x9000, 0x1000);
        mapper
    }

    #[test]
    fn translates_inside_pool() {
        let mut mapper = mapper();
        let region = mapper
            .attach(BufferDescriptor::new(0x1800, 0x100))
            .expect("inside pool");
        assert_eq!(region.dsp_address, 0x9800);
        assert_eq!(region.pool, Some(0));
        assert_eq!(mapper.pool(0).map(MemoryPool::attachments), Some(1));

        mapper.release(region);
        assert_eq!(mapper.pool(0).map(MemoryPool::attachments), Some(0));
    }

    #[test]
    fn rejects_outside_and_straddling() {
        let mut mapper = mapper();
        let err = mapper
            .attach(BufferDescriptor::new(0x4000, 0x10))
            .expect_err("outside pool");
        assert_eq!(err.code, ErrorCode::InvalidAddressInfo);
        assert_eq!(err.extra, 0x4000);

        assert!(mapper.attach(BufferDescriptor::new(0x1F00, 0x200)).is_err());
        assert!(mapper.attach(BufferDescriptor::new(u64::MAX, 2)).is_err());
        assert!(mapper.attach(BufferDescriptor::new(0, 0)).is_err());
    }

    #[test]
    fn force_mapping_accepts_unknown_addresses() {
        let mut mapper = mapper();
        mapper.set_force_mapping(true);
        let region = mapper
            .attach(BufferDescriptor::new(0x4000, 0x10))
            .expect("forced");
        assert_eq!(region.dsp_address, 0x4000);
        assert_eq!(region.pool, None);
        assert!(mapper.attach(BufferDescriptor::new(0, 0x10)).is_err());
    }

    #[test]
    fn unregister_waits_for_release() {
        let mut mapper = mapper();
        let region = mapper
            .attach(BufferDescriptor::new(0x1000, 0x10))
            .expect("inside pool");
        assert!(!mapper.unregister(0));
        mapper.release(region);
        assert!(mapper.unregister(0));
        assert!(mapper.pool(0).is_none());
        assert_eq!(mapper.register(0x2000, 0x2000, 0x10), 0);
    }
}
