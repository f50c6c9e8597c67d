//! Staging buffer and device image lifecycle.
//!
//! [`MemoryManager`] keeps one aligned host staging buffer and three device
//! images sized for the last successfully provisioned geometry:
//!
//! | role        | access     | element            | storage      |
//! |-------------|------------|--------------------|--------------|
//! | `Input`     | read-only  | u16                | device       |
//! | `Staging`   | read-write | [`DeviceElement`]  | host-aliased |
//! | `Transform` | read-write | [`DeviceElement`]  | device       |
//!
//! `init` with new geometry tears everything down and provisions again; with
//! the same geometry it refills the staging buffer in place and enqueues a
//! write into the staging image. Teardown releases the device images first,
//! then frees the host memory they may alias.

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use dwt_core::{
    AccessMode, ChannelLayout, ChannelType, DeviceElement, Dimensions, Error as CoreError,
    ImageFormat, Sample,
};

use crate::config::{ManagerConfig, format_bytes};
use crate::device::{DeviceCode, DeviceContext, ImageDesc, ImageStorage};
use crate::host_buffer::HostBuffer;
use crate::mapping::MappedImage;
use crate::{ComputeError, ComputeResult, DeviceOp, ReleaseFailure};

/// The three device images owned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageRole {
    /// Read-only u16 input for the preprocessing kernel.
    Input,
    /// Read-write image backed by the host staging buffer.
    Staging,
    /// Read-write destination of the transform kernel.
    Transform,
}

impl ImageRole {
    /// Roles in provisioning and release order.
    pub const ALL: [ImageRole; 3] = [ImageRole::Input, ImageRole::Staging, ImageRole::Transform];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Staging => "staging",
            Self::Transform => "transform",
        }
    }

    /// Descriptor of this role's image for the given geometry and pipeline.
    pub fn desc(&self, dims: Dimensions, layout: ChannelLayout, element: DeviceElement) -> ImageDesc {
        let order = layout.channel_order();
        let (data_type, access) = match self {
            Self::Input => (ChannelType::UnsignedInt16, AccessMode::ReadOnly),
            Self::Staging | Self::Transform => (element.channel_type(), AccessMode::ReadWrite),
        };
        ImageDesc::new(dims, ImageFormat::new(order, data_type), access)
    }
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// What an [`MemoryManager::init`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Zero width/height or no components: nothing touched.
    Skipped,
    /// Buffers were (re)allocated for new geometry.
    Provisioned,
    /// Existing buffers were refilled and a device write enqueued.
    Refreshed,
}

/// Geometry and pipeline of the current provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Provision {
    dims: Dimensions,
    layout: ChannelLayout,
    element: DeviceElement,
}

/// Staging buffer sizing for one provisioning.
#[derive(Debug, Clone, Copy)]
struct StagingPlan {
    pixels: usize,
    elements: usize,
    min_bytes: usize,
    alignment: usize,
}

/// Owner of the host staging buffer and the pipeline's device images.
///
/// Not internally synchronised: one pipeline thread drives it.
pub struct MemoryManager<T: Sample, D: DeviceContext> {
    device: Arc<D>,
    config: ManagerConfig,
    host: Option<HostBuffer<T>>,
    current: Option<Provision>,
    input: Option<D::Image>,
    staging: Option<D::Image>,
    transform: Option<D::Image>,
}

impl<T: Sample, D: DeviceContext> MemoryManager<T, D> {
    /// Create an empty manager with configuration from the environment.
    pub fn new(device: Arc<D>) -> Self {
        Self::with_config(device, ManagerConfig::from_env())
    }

    /// Create an empty manager with explicit configuration.
    pub fn with_config(device: Arc<D>, config: ManagerConfig) -> Self {
        Self {
            device,
            config,
            host: None,
            current: None,
            input: None,
            staging: None,
            transform: None,
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Geometry of the last complete provisioning.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.current.map(|p| p.dims)
    }

    pub fn layout(&self) -> Option<ChannelLayout> {
        self.current.map(|p| p.layout)
    }

    pub fn element(&self) -> Option<DeviceElement> {
        self.current.map(|p| p.element)
    }

    /// Host staging buffer, if allocated.
    pub fn host_buffer(&self) -> Option<&HostBuffer<T>> {
        self.host.as_ref()
    }

    /// Device image for `role`, if allocated.
    pub fn image(&self, role: ImageRole) -> Option<&D::Image> {
        match role {
            ImageRole::Input => self.input.as_ref(),
            ImageRole::Staging => self.staging.as_ref(),
            ImageRole::Transform => self.transform.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: ImageRole) -> &mut Option<D::Image> {
        match role {
            ImageRole::Input => &mut self.input,
            ImageRole::Staging => &mut self.staging,
            ImageRole::Transform => &mut self.transform,
        }
    }

    /// Load planar components and make the device images match them.
    ///
    /// `components` holds one (gray) or three (R, G, B) planes of at least
    /// `width * height` samples. Zero width or height, or no components, is a
    /// silent no-op. New geometry, channel layout or element type triggers a
    /// full teardown and re-provisioning; otherwise the staging buffer is
    /// refilled in place and a non-blocking write into the staging image is
    /// enqueued. Callers synchronise (for example by mapping) before device use.
    pub fn init(
        &mut self,
        components: &[&[T]],
        width: usize,
        height: usize,
        element: DeviceElement,
    ) -> ComputeResult<InitOutcome> {
        trace!(components = components.len(), width, height, %element, "init");

        if width == 0 || height == 0 || components.is_empty() {
            debug!(width, height, components = components.len(), "init skipped: empty input");
            return Ok(InitOutcome::Skipped);
        }

        let layout = ChannelLayout::from_component_count(components.len())?;
        let dims = Dimensions::new(width, height);
        let pixels = dims.pixel_count()?;
        for plane in components {
            if plane.len() < pixels {
                return Err(CoreError::BufferSizeMismatch {
                    expected: pixels,
                    actual: plane.len(),
                }
                .into());
            }
        }

        let wanted = Provision { dims, layout, element };
        if self.current == Some(wanted) {
            self.refresh(components, wanted)?;
            Ok(InitOutcome::Refreshed)
        } else {
            let plan = self.staging_plan(wanted)?;
            self.provision(components, wanted, plan)?;
            Ok(InitOutcome::Provisioned)
        }
    }

    fn refresh(&mut self, components: &[&[T]], p: Provision) -> ComputeResult<()> {
        let (Some(host), Some(staging)) = (self.host.as_mut(), self.staging.as_ref()) else {
            return Err(ComputeError::InvalidArgument(
                "staging resources missing for current geometry".into(),
            ));
        };

        host.fill_planar(components, p.dims.width * p.dims.height)?;
        self.device
            .enqueue_write_image(staging, p.dims.region(), host.as_bytes())
            .map_err(|code| device_error(DeviceOp::EnqueueWrite, code))?;

        debug!(dims = %p.dims, "staging refreshed, write enqueued");
        Ok(())
    }

    /// Size the staging buffer for `p` and check it against the host budget.
    ///
    /// Runs before any teardown so an oversized request leaves the current
    /// provisioning intact.
    fn staging_plan(&self, p: Provision) -> ComputeResult<StagingPlan> {
        let pixels = p.dims.pixel_count()?;
        let elements = pixels.saturating_mul(p.layout.device_channels());
        // The staging image reads its pixels straight from this buffer, so it
        // must cover the device format as well as the host samples.
        let min_bytes = ImageRole::Staging.desc(p.dims, p.layout, p.element).size_bytes();
        let requested = elements.saturating_mul(std::mem::size_of::<T>()).max(min_bytes);

        let budget = self.config.host_budget();
        if requested as u64 > budget {
            return Err(CoreError::alloc(
                requested,
                format!("exceeds host budget of {}", format_bytes(budget)),
            )
            .into());
        }

        let device_alignment = self.device.alignment();
        let alignment = self.config.effective_alignment(device_alignment);
        debug!(device_alignment, alignment, requested, "staging plan");

        Ok(StagingPlan {
            pixels,
            elements,
            min_bytes,
            alignment,
        })
    }

    fn provision(&mut self, components: &[&[T]], p: Provision, plan: StagingPlan) -> ComputeResult<()> {
        self.free_buffers()?;

        let StagingPlan {
            pixels,
            elements,
            min_bytes,
            alignment,
        } = plan;
        let staging_desc = ImageRole::Staging.desc(p.dims, p.layout, p.element);

        let host = self.host.insert(HostBuffer::allocate(elements, min_bytes, alignment)?);
        host.fill_planar(components, pixels)?;
        debug!(bytes = host.size_bytes(), size = %format_bytes(host.size_bytes() as u64), "staging buffer allocated");

        let device = &*self.device;

        let input_desc = ImageRole::Input.desc(p.dims, p.layout, p.element);
        self.input = Some(create_image(device, ImageRole::Input, &input_desc, ImageStorage::DeviceOnly)?);

        self.staging = Some(create_image(
            device,
            ImageRole::Staging,
            &staging_desc,
            ImageStorage::HostAliased(host.as_bytes()),
        )?);

        let transform_desc = ImageRole::Transform.desc(p.dims, p.layout, p.element);
        self.transform = Some(create_image(
            device,
            ImageRole::Transform,
            &transform_desc,
            ImageStorage::DeviceOnly,
        )?);

        self.current = Some(p);
        info!(
            dims = %p.dims,
            layout = %p.layout,
            element = %p.element,
            sample = T::NAME,
            device = device.name(),
            "device images provisioned"
        );
        Ok(())
    }

    /// Map the whole of `role`'s image for host reads, blocking until queued
    /// work on it completes.
    ///
    /// Fails with an invalid argument, without calling the device, when the
    /// image is not provisioned.
    pub fn map_image(&self, role: ImageRole) -> ComputeResult<MappedImage<'_>> {
        trace!(%role, "map_image");
        let (Some(p), Some(image)) = (self.current, self.image(role)) else {
            return Err(ComputeError::InvalidArgument(format!("{role} image is not provisioned")));
        };

        let region = p.dims.region();
        let mapped = self
            .device
            .map_image(image, region)
            .map_err(|code| device_error(DeviceOp::MapImage(role), code))?;

        let bytes_per_pixel = role.desc(p.dims, p.layout, p.element).format.bytes_per_pixel();
        Ok(MappedImage::new(
            role,
            mapped.ptr,
            mapped.row_pitch,
            p.dims.width,
            p.dims.height,
            bytes_per_pixel,
        ))
    }

    /// Release a mapping obtained from [`map_image`](Self::map_image).
    pub fn unmap_image(&self, role: ImageRole, mapping: MappedImage<'_>) -> ComputeResult<()> {
        trace!(%role, "unmap_image");
        if mapping.role() != role {
            return Err(ComputeError::InvalidArgument(format!(
                "mapping belongs to {}, not {role}",
                mapping.role()
            )));
        }
        let Some(image) = self.image(role) else {
            return Err(ComputeError::InvalidArgument(format!("{role} image is not provisioned")));
        };

        self.device
            .unmap_image(image, mapping.raw())
            .map_err(|code| device_error(DeviceOp::UnmapImage(role), code))
    }

    /// Release all device images, then free the staging buffer.
    ///
    /// Every release is attempted even if an earlier one fails; failures are
    /// reported together. Images are dropped from the manager either way, so a
    /// second call makes no device calls.
    pub fn free_buffers(&mut self) -> ComputeResult<()> {
        trace!("free_buffers");
        let mut failures = Vec::new();

        for role in ImageRole::ALL {
            let Some(image) = self.slot_mut(role).take() else {
                continue;
            };
            match self.device.release_image(image) {
                Ok(()) => debug!(%role, "image released"),
                Err(code) => {
                    error!(%role, code = code.raw(), name = code.translate(), "release_image failed");
                    failures.push(ReleaseFailure { role, code });
                }
            }
        }

        if let Some(host) = self.host.take() {
            if failures.iter().any(|f| f.role == ImageRole::Staging) {
                // The device may still read through the alias.
                warn!(bytes = host.size_bytes(), "staging image not released, leaking host buffer");
                std::mem::forget(host);
            } else {
                debug!(bytes = host.size_bytes(), "staging buffer freed");
                drop(host);
            }
        }

        self.current = None;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ComputeError::Teardown { failures })
        }
    }
}

impl<T: Sample, D: DeviceContext> Drop for MemoryManager<T, D> {
    fn drop(&mut self) {
        if let Err(e) = self.free_buffers() {
            error!(error = %e, "teardown on drop failed");
        }
    }
}

impl<T: Sample, D: DeviceContext> std::fmt::Debug for MemoryManager<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("sample", &T::NAME)
            .field("device", &self.device.name())
            .field("dims", &self.dimensions())
            .field("layout", &self.layout())
            .field("element", &self.element())
            .field("host", &self.host)
            .finish()
    }
}

fn create_image<D: DeviceContext>(
    device: &D,
    role: ImageRole,
    desc: &ImageDesc,
    storage: ImageStorage<'_>,
) -> ComputeResult<D::Image> {
    debug!(
        %role,
        width = desc.width,
        height = desc.height,
        data_type = %desc.format.data_type,
        host_aliased = storage.is_host_aliased(),
        "create_image"
    );
    device
        .create_image(desc, storage)
        .map_err(|code| device_error(DeviceOp::CreateImage(role), code))
}

fn device_error(op: DeviceOp, code: DeviceCode) -> ComputeError {
    error!(%op, code = code.raw(), name = code.translate(), "device operation failed");
    ComputeError::Device { op, code }
}
