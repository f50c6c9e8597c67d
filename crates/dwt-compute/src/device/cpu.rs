//! Host-emulated device context.
//!
//! Images live in RAM. Host-aliased images take a snapshot of the aliased
//! memory at creation and record its address, which matches the caching a
//! driver is allowed to do for host-pointer images. Writes are queued and only
//! land on a blocking map or [`CpuDevice::finish`], so asynchronous behaviour
//! is observable.
//!
//! Faults can be injected per operation to exercise partial-failure paths.

use std::collections::{HashMap, VecDeque};
use std::ptr::NonNull;
use std::sync::Mutex;

use dwt_core::Region;

use super::{DeviceCode, DeviceContext, DeviceResult, ImageDesc, ImageStorage, MappedRegion};

/// Default base address alignment reported by the emulated device (1024 bits).
const DEFAULT_ALIGNMENT: usize = 128;

/// Largest image side accepted by the emulated device.
const DEFAULT_MAX_IMAGE_DIM: usize = 16384;

/// Handle to an image held by [`CpuDevice`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CpuImageHandle {
    id: u64,
}

impl CpuImageHandle {
    /// Device-unique image id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Operation selector for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    CreateImage,
    ReleaseImage,
    EnqueueWrite,
    MapImage,
    UnmapImage,
}

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub images_created: usize,
    pub images_released: usize,
    pub writes_enqueued: usize,
    pub writes_completed: usize,
    pub maps: usize,
    pub unmaps: usize,
}

impl DeviceStats {
    /// Total number of device calls that reached the emulated queue.
    pub fn total_calls(&self) -> usize {
        self.images_created + self.images_released + self.writes_enqueued + self.maps + self.unmaps
    }
}

struct CpuImage {
    desc: ImageDesc,
    data: Box<[u8]>,
    host_ptr: Option<usize>,
    mapped: Vec<usize>,
}

impl CpuImage {
    fn region_offset(&self, region: &Region) -> DeviceResult<usize> {
        let [x, y, z] = region.origin;
        let [w, h, d] = region.extent;
        if z != 0 || d != 1 || w == 0 || h == 0 {
            return Err(DeviceCode::INVALID_VALUE);
        }
        if x + w > self.desc.width || y + h > self.desc.height {
            return Err(DeviceCode::INVALID_VALUE);
        }
        Ok(y * self.desc.row_bytes() + x * self.desc.format.bytes_per_pixel())
    }

    fn write(&mut self, region: &Region, bytes: &[u8]) -> DeviceResult<()> {
        let offset = self.region_offset(region)?;
        let pitch = self.desc.row_bytes();
        let row = region.width() * self.desc.format.bytes_per_pixel();
        for (y, src) in bytes.chunks_exact(row).take(region.height()).enumerate() {
            let start = offset + y * pitch;
            self.data[start..start + row].copy_from_slice(src);
        }
        Ok(())
    }
}

struct PendingWrite {
    id: u64,
    region: Region,
    bytes: Vec<u8>,
}

struct Fault {
    op: FaultOp,
    skip: usize,
    code: DeviceCode,
}

#[derive(Default)]
struct CpuState {
    next_id: u64,
    images: HashMap<u64, CpuImage>,
    pending: VecDeque<PendingWrite>,
    faults: Vec<Fault>,
    stats: DeviceStats,
}

impl CpuState {
    fn check_fault(&mut self, op: FaultOp) -> DeviceResult<()> {
        let Some(idx) = self.faults.iter().position(|f| f.op == op) else {
            return Ok(());
        };
        if self.faults[idx].skip == 0 {
            let fault = self.faults.remove(idx);
            return Err(fault.code);
        }
        self.faults[idx].skip -= 1;
        Ok(())
    }

    /// Apply queued writes, all of them or only those targeting `only`.
    ///
    /// A failing write stays queued together with every write after it.
    fn flush(&mut self, only: Option<u64>) -> DeviceResult<()> {
        let (ready, kept): (VecDeque<_>, VecDeque<_>) = self
            .pending
            .drain(..)
            .partition(|w| only.is_none_or(|id| id == w.id));
        self.pending = kept;

        let mut ready = ready.into_iter();
        while let Some(write) = ready.next() {
            let applied = match self.images.get_mut(&write.id) {
                Some(image) => image.write(&write.region, &write.bytes),
                None => Err(DeviceCode::INVALID_MEM_OBJECT),
            };
            if let Err(code) = applied {
                let mut requeue: VecDeque<_> = std::iter::once(write).chain(ready).collect();
                requeue.append(&mut self.pending);
                self.pending = requeue;
                return Err(code);
            }
            self.stats.writes_completed += 1;
        }
        Ok(())
    }
}

/// Device context backed by host memory.
pub struct CpuDevice {
    name: String,
    alignment: usize,
    max_image_dim: usize,
    state: Mutex<CpuState>,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self {
            name: "CPU (emulated)".to_string(),
            alignment: DEFAULT_ALIGNMENT,
            max_image_dim: DEFAULT_MAX_IMAGE_DIM,
            state: Mutex::new(CpuState::default()),
        }
    }

    /// Override the reported alignment requirement.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Override the largest accepted image side.
    pub fn with_max_image_dim(mut self, max_image_dim: usize) -> Self {
        self.max_image_dim = max_image_dim;
        self
    }

    /// Make the call to `op` after `skip` successful ones fail with `code`.
    pub fn inject_fault(&self, op: FaultOp, skip: usize, code: DeviceCode) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push(Fault { op, skip, code });
        }
    }

    /// Call counters so far.
    pub fn stats(&self) -> DeviceStats {
        self.state.lock().map(|s| s.stats).unwrap_or_default()
    }

    /// Number of images currently allocated.
    pub fn live_images(&self) -> usize {
        self.state.lock().map(|s| s.images.len()).unwrap_or(0)
    }

    /// Number of queued writes not yet applied.
    pub fn pending_writes(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Descriptor of a live image.
    pub fn image_desc(&self, image: &CpuImageHandle) -> Option<ImageDesc> {
        let state = self.state.lock().ok()?;
        state.images.get(&image.id).map(|i| i.desc)
    }

    /// Address of the host memory an image aliases.
    pub fn host_ptr(&self, image: &CpuImageHandle) -> Option<usize> {
        let state = self.state.lock().ok()?;
        state.images.get(&image.id).and_then(|i| i.host_ptr)
    }

    /// Current image bytes, without applying queued writes.
    pub fn contents(&self, image: &CpuImageHandle) -> Option<Vec<u8>> {
        let state = self.state.lock().ok()?;
        state.images.get(&image.id).map(|i| i.data.to_vec())
    }

    /// Number of mappings of an image not yet released.
    pub fn outstanding_maps(&self, image: &CpuImageHandle) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.images.get(&image.id).map(|i| i.mapped.len()))
            .unwrap_or(0)
    }

    fn lock(&self) -> DeviceResult<std::sync::MutexGuard<'_, CpuState>> {
        self.state.lock().map_err(|_| DeviceCode::OUT_OF_RESOURCES)
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuDevice")
            .field("name", &self.name)
            .field("alignment", &self.alignment)
            .field("live_images", &self.live_images())
            .finish()
    }
}

impl DeviceContext for CpuDevice {
    type Image = CpuImageHandle;

    fn name(&self) -> &str {
        &self.name
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn create_image(&self, desc: &ImageDesc, storage: ImageStorage<'_>) -> DeviceResult<Self::Image> {
        let mut state = self.lock()?;
        state.check_fault(FaultOp::CreateImage)?;

        if desc.width == 0
            || desc.height == 0
            || desc.width > self.max_image_dim
            || desc.height > self.max_image_dim
        {
            return Err(DeviceCode::INVALID_IMAGE_SIZE);
        }

        let size = desc.size_bytes();
        let (data, host_ptr) = match storage {
            ImageStorage::DeviceOnly => (vec![0u8; size].into_boxed_slice(), None),
            ImageStorage::HostAliased(host) => {
                if host.len() < size {
                    return Err(DeviceCode::INVALID_HOST_PTR);
                }
                (host[..size].to_vec().into_boxed_slice(), Some(host.as_ptr() as usize))
            }
        };

        let id = state.next_id;
        state.next_id += 1;
        state.images.insert(
            id,
            CpuImage {
                desc: *desc,
                data,
                host_ptr,
                mapped: Vec::new(),
            },
        );
        state.stats.images_created += 1;
        Ok(CpuImageHandle { id })
    }

    fn release_image(&self, image: Self::Image) -> DeviceResult<()> {
        let mut state = self.lock()?;
        state.check_fault(FaultOp::ReleaseImage)?;
        state.images.remove(&image.id).ok_or(DeviceCode::INVALID_MEM_OBJECT)?;
        state.pending.retain(|w| w.id != image.id);
        state.stats.images_released += 1;
        Ok(())
    }

    fn enqueue_write_image(&self, image: &Self::Image, region: Region, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.lock()?;
        state.check_fault(FaultOp::EnqueueWrite)?;

        let target = state.images.get(&image.id).ok_or(DeviceCode::INVALID_MEM_OBJECT)?;
        target.region_offset(&region)?;
        let needed = region.width() * region.height() * target.desc.format.bytes_per_pixel();
        if data.len() < needed {
            return Err(DeviceCode::INVALID_VALUE);
        }

        state.pending.push_back(PendingWrite {
            id: image.id,
            region,
            bytes: data[..needed].to_vec(),
        });
        state.stats.writes_enqueued += 1;
        Ok(())
    }

    fn map_image(&self, image: &Self::Image, region: Region) -> DeviceResult<MappedRegion> {
        let mut state = self.lock()?;
        state.check_fault(FaultOp::MapImage)?;
        if !state.images.contains_key(&image.id) {
            return Err(DeviceCode::INVALID_MEM_OBJECT);
        }

        // Blocking map: queued writes to this image land first.
        state.flush(Some(image.id))?;

        let target = state.images.get_mut(&image.id).ok_or(DeviceCode::INVALID_MEM_OBJECT)?;
        let offset = target.region_offset(&region)?;
        let row_pitch = target.desc.row_bytes();
        let ptr = NonNull::new(target.data[offset..].as_mut_ptr()).ok_or(DeviceCode::MAP_FAILURE)?;
        target.mapped.push(ptr.as_ptr() as usize);
        state.stats.maps += 1;

        Ok(MappedRegion { ptr, row_pitch })
    }

    fn unmap_image(&self, image: &Self::Image, ptr: NonNull<u8>) -> DeviceResult<()> {
        let mut state = self.lock()?;
        state.check_fault(FaultOp::UnmapImage)?;

        let target = state.images.get_mut(&image.id).ok_or(DeviceCode::INVALID_MEM_OBJECT)?;
        let addr = ptr.as_ptr() as usize;
        let idx = target
            .mapped
            .iter()
            .position(|&m| m == addr)
            .ok_or(DeviceCode::INVALID_VALUE)?;
        target.mapped.swap_remove(idx);
        state.stats.unmaps += 1;
        Ok(())
    }

    fn finish(&self) -> DeviceResult<()> {
        self.lock()?.flush(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwt_core::{AccessMode, ChannelOrder, ChannelType, Dimensions, ImageFormat};

    fn gray_desc(w: usize, h: usize) -> ImageDesc {
        ImageDesc::new(
            Dimensions::new(w, h),
            ImageFormat::new(ChannelOrder::R, ChannelType::UnsignedInt16),
            AccessMode::ReadWrite,
        )
    }

    #[test]
    fn test_create_release() {
        let dev = CpuDevice::new();
        let img = dev.create_image(&gray_desc(4, 4), ImageStorage::DeviceOnly).unwrap();
        assert_eq!(dev.live_images(), 1);
        dev.release_image(img).unwrap();
        assert_eq!(dev.live_images(), 0);
        assert_eq!(dev.stats().images_created, 1);
        assert_eq!(dev.stats().images_released, 1);
    }

    #[test]
    fn test_invalid_size() {
        let dev = CpuDevice::new().with_max_image_dim(8);
        let err = dev.create_image(&gray_desc(16, 4), ImageStorage::DeviceOnly).unwrap_err();
        assert_eq!(err, DeviceCode::INVALID_IMAGE_SIZE);
    }

    #[test]
    fn test_host_aliased_snapshot() {
        let dev = CpuDevice::new();
        let host: Vec<u8> = (0..32).collect();
        let img = dev.create_image(&gray_desc(4, 4), ImageStorage::HostAliased(&host)).unwrap();
        assert_eq!(dev.host_ptr(&img), Some(host.as_ptr() as usize));
        assert_eq!(dev.contents(&img).unwrap(), host);

        let short = vec![0u8; 8];
        let err = dev.create_image(&gray_desc(4, 4), ImageStorage::HostAliased(&short)).unwrap_err();
        assert_eq!(err, DeviceCode::INVALID_HOST_PTR);
    }

    #[test]
    fn test_write_is_deferred_until_map() {
        let dev = CpuDevice::new();
        let img = dev.create_image(&gray_desc(2, 2), ImageStorage::DeviceOnly).unwrap();
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        dev.enqueue_write_image(&img, Region::full(2, 2), &data).unwrap();

        assert_eq!(dev.pending_writes(), 1);
        assert_eq!(dev.contents(&img).unwrap(), vec![0; 8]);

        let mapped = dev.map_image(&img, Region::full(2, 2)).unwrap();
        assert_eq!(mapped.row_pitch, 4);
        assert_eq!(dev.pending_writes(), 0);
        assert_eq!(dev.contents(&img).unwrap(), data.to_vec());

        dev.unmap_image(&img, mapped.ptr).unwrap();
        assert_eq!(dev.outstanding_maps(&img), 0);
    }

    #[test]
    fn test_finish_flushes_all() {
        let dev = CpuDevice::new();
        let a = dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).unwrap();
        let b = dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).unwrap();
        dev.enqueue_write_image(&a, Region::full(1, 1), &[9, 9]).unwrap();
        dev.enqueue_write_image(&b, Region::full(1, 1), &[7, 7]).unwrap();
        dev.finish().unwrap();
        assert_eq!(dev.stats().writes_completed, 2);
        assert_eq!(dev.contents(&b).unwrap(), vec![7, 7]);
    }

    #[test]
    fn test_failed_flush_keeps_remaining_writes() {
        let dev = CpuDevice::new();
        let a = dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).unwrap();
        let b = dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).unwrap();
        dev.enqueue_write_image(&a, Region::full(1, 1), &[1, 1]).unwrap();
        // A write whose image vanished behind the queue's back.
        dev.state.lock().unwrap().pending.push_back(PendingWrite {
            id: 999,
            region: Region::full(1, 1),
            bytes: vec![0, 0],
        });
        dev.enqueue_write_image(&b, Region::full(1, 1), &[2, 2]).unwrap();

        assert_eq!(dev.finish().unwrap_err(), DeviceCode::INVALID_MEM_OBJECT);
        assert_eq!(dev.stats().writes_completed, 1);
        assert_eq!(dev.contents(&a).unwrap(), vec![1, 1]);
        assert_eq!(dev.pending_writes(), 2);

        // Mapping b still applies its queued write; the broken one stays.
        let mapped = dev.map_image(&b, Region::full(1, 1)).unwrap();
        assert_eq!(dev.contents(&b).unwrap(), vec![2, 2]);
        assert_eq!(dev.pending_writes(), 1);
        dev.unmap_image(&b, mapped.ptr).unwrap();
    }

    #[test]
    fn test_unmap_unknown_pointer() {
        let dev = CpuDevice::new();
        let img = dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).unwrap();
        let mut other = [0u8; 2];
        let ptr = NonNull::new(other.as_mut_ptr()).unwrap();
        assert_eq!(dev.unmap_image(&img, ptr).unwrap_err(), DeviceCode::INVALID_VALUE);
    }

    #[test]
    fn test_fault_injection_skips() {
        let dev = CpuDevice::new();
        dev.inject_fault(FaultOp::CreateImage, 1, DeviceCode::MEM_OBJECT_ALLOCATION_FAILURE);
        assert!(dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).is_ok());
        let err = dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).unwrap_err();
        assert_eq!(err, DeviceCode::MEM_OBJECT_ALLOCATION_FAILURE);
        // Fault fires once.
        assert!(dev.create_image(&gray_desc(1, 1), ImageStorage::DeviceOnly).is_ok());
    }
}
