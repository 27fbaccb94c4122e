//! wgpu-based GPU compute backend (Metal / Vulkan / DX12).
//!
//! Buffers stay resident on the device. Fill, scaling, block copies and the
//! per-workgroup part of the voxel sum run as compute shaders; FFT
//! convolution and the solver read the data back and run the host
//! implementations.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ndarray::Array3;
use wgpu::util::DeviceExt;

use crate::error::{DeconError, Result};
use crate::solver::richardson_lucy::{self, RichardsonLucyInputs};
use crate::volume::{Dims3, ElementType, Offset3, Volume};

use super::cpu::{ensure_fits, ensure_same_dims};
use super::fft3d;
use super::{BufferInner, ComputeBackend, DeviceBuffer, IterationRequest};

// ---------------------------------------------------------------------------
// Inline WGSL shaders
// ---------------------------------------------------------------------------

const FILL_WGSL: &str = r"
struct Params { count: u32, row_stride: u32, value: f32, _pad: u32 }
@group(0) @binding(0) var<storage, read_write> output: array<f32>;
@group(0) @binding(1) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.y * params.row_stride + gid.x;
    if i >= params.count { return; }
    output[i] = params.value;
}
";

const SCALE_WGSL: &str = r"
struct Params { count: u32, row_stride: u32, factor: f32, _pad: u32 }
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.y * params.row_stride + gid.x;
    if i >= params.count { return; }
    output[i] = input[i] * params.factor;
}
";

const BLOCK_COPY_WGSL: &str = r"
struct Params {
    src_w: u32, src_h: u32, src_x: u32, src_y: u32,
    src_z: u32, dst_w: u32, dst_h: u32, dst_x: u32,
    dst_y: u32, dst_z: u32, block_w: u32, block_h: u32,
    block_d: u32, _pad0: u32, _pad1: u32, _pad2: u32,
}
@group(0) @binding(0) var<storage, read>       src:    array<f32>;
@group(0) @binding(1) var<storage, read_write> dst:    array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;
@compute @workgroup_size(8, 8, 4)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.block_w || gid.y >= params.block_h || gid.z >= params.block_d { return; }
    let s = ((gid.z + params.src_z) * params.src_h + gid.y + params.src_y) * params.src_w
        + gid.x + params.src_x;
    let d = ((gid.z + params.dst_z) * params.dst_h + gid.y + params.dst_y) * params.dst_w
        + gid.x + params.dst_x;
    dst[d] = src[s];
}
";

const SUM_PARTIALS_WGSL: &str = r"
struct Params { count: u32, row_stride: u32, value: f32, _pad: u32 }
@group(0) @binding(0) var<storage, read>       input:    array<f32>;
@group(0) @binding(1) var<storage, read_write> partials: array<f32>;
@group(0) @binding(2) var<uniform>             params:   Params;
var<workgroup> scratch: array<f32, 256>;
@compute @workgroup_size(256)
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(local_invocation_index) lid: u32,
    @builtin(workgroup_id) wid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let i = gid.y * params.row_stride + gid.x;
    var v = 0.0;
    if i < params.count { v = input[i]; }
    scratch[lid] = v;
    workgroupBarrier();
    for (var stride = 128u; stride > 0u; stride = stride / 2u) {
        if lid < stride { scratch[lid] = scratch[lid] + scratch[lid + stride]; }
        workgroupBarrier();
    }
    if lid == 0u { partials[wid.y * groups.x + wid.x] = scratch[0]; }
}
";

// ---------------------------------------------------------------------------
// Uniform parameter structs (must match WGSL layouts exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ElementwiseParams {
    count: u32,
    row_stride: u32,
    value: f32,
    _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BlockCopyParams {
    src_w: u32,
    src_h: u32,
    src_x: u32,
    src_y: u32,
    src_z: u32,
    dst_w: u32,
    dst_h: u32,
    dst_x: u32,
    dst_y: u32,
    dst_z: u32,
    block_w: u32,
    block_h: u32,
    block_d: u32,
    _pad: [u32; 3],
}

const LINEAR_WORKGROUP: u32 = 256;
const MAX_WORKGROUPS_PER_DIM: u32 = 65_535;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type WgpuParts<'a> = (&'a wgpu::Buffer, &'a wgpu::Device, &'a wgpu::Queue);

fn gpu_buf(buf: &DeviceBuffer) -> Result<&wgpu::Buffer> {
    gpu_parts(buf).map(|(buffer, _, _)| buffer)
}

/// The buffer together with the device and queue it was created on.
fn gpu_parts(buf: &DeviceBuffer) -> Result<WgpuParts<'_>> {
    match &buf.inner {
        BufferInner::Wgpu {
            buffer,
            device,
            queue,
        } => Ok((buffer, device.as_ref(), queue.as_ref())),
        BufferInner::Released => Err(DeconError::DeviceResource(format!(
            "buffer {} used after release",
            buf.dims()
        ))),
        BufferInner::Cpu(_) => Err(DeconError::DeviceResource(
            "WgpuBackend received a CPU buffer".into(),
        )),
    }
}

/// Copy a storage buffer into a mappable staging buffer and read it back.
fn read_back(
    buffer: &wgpu::Buffer,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> Result<Vec<f32>> {
    let size = buffer.size();
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: None,
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut enc = device.create_command_encoder(&Default::default());
    enc.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    queue.submit(std::iter::once(enc.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    slice.map_async(wgpu::MapMode::Read, move |r| {
        tx.send(r).ok();
    });
    device.poll(wgpu::PollType::wait_indefinitely()).ok();
    rx.recv()
        .map_err(|_| DeconError::DeviceResource("GPU channel closed".into()))?
        .map_err(|e| DeconError::DeviceResource(format!("Buffer mapping failed: {e}")))?;

    let data = slice.get_mapped_range();
    let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();
    staging.destroy();
    Ok(result)
}

const fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| DeconError::DeviceResource(format!("{what} {value} exceeds GPU index range")))
}

/// Workgroup grid for a linear kernel over `count` elements, folded into two
/// dimensions when one would exceed the per-dimension limit. Returns the grid
/// and the row stride in elements.
fn linear_grid(count: u32) -> ((u32, u32, u32), u32) {
    let groups = div_ceil(count.max(1), LINEAR_WORKGROUP);
    let x = groups.min(MAX_WORKGROUPS_PER_DIM);
    let y = div_ceil(groups, x);
    ((x, y, 1), x * LINEAR_WORKGROUP)
}

// ---------------------------------------------------------------------------
// WgpuBackend
// ---------------------------------------------------------------------------

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    max_binding_size: u64,
    fill_pipeline: wgpu::ComputePipeline,
    scale_pipeline: wgpu::ComputePipeline,
    block_copy_pipeline: wgpu::ComputePipeline,
    sum_partials_pipeline: wgpu::ComputePipeline,
}

impl WgpuBackend {
    pub fn new() -> std::result::Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| format!("No suitable GPU adapter found: {e}"))?;

        let adapter_name = adapter.get_info().name.clone();
        tracing::info!("GPU adapter: {adapter_name}");

        let limits = wgpu::Limits::default();
        let max_binding_size = limits.max_storage_buffer_binding_size as u64;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("decon"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                ..Default::default()
            },
        ))
        .map_err(|e| format!("Failed to create GPU device: {e}"))?;

        let device: Arc<wgpu::Device> = Arc::new(device);
        let queue: Arc<wgpu::Queue> = Arc::new(queue);

        let mk = |label, src: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(src.into()),
            })
        };
        let fill_mod = mk("fill", FILL_WGSL);
        let scale_mod = mk("scale", SCALE_WGSL);
        let copy_mod = mk("block_copy", BLOCK_COPY_WGSL);
        let sum_mod = mk("sum_partials", SUM_PARTIALS_WGSL);

        let pipe = |module: &wgpu::ShaderModule, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: None,
                layout: None,
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Ok(Self {
            adapter_name,
            max_binding_size,
            fill_pipeline: pipe(&fill_mod, "main"),
            scale_pipeline: pipe(&scale_mod, "main"),
            block_copy_pipeline: pipe(&copy_mod, "main"),
            sum_partials_pipeline: pipe(&sum_mod, "main"),
            device,
            queue,
        })
    }

    // --- Buffer helpers ---

    fn byte_size(&self, dims: Dims3) -> Result<u64> {
        dims.ensure_non_empty()?;
        let size = dims.voxel_count() as u64 * std::mem::size_of::<f32>() as u64;
        if size > self.max_binding_size {
            return Err(DeconError::DeviceResource(format!(
                "volume {dims} needs {size} bytes, device binding limit is {}",
                self.max_binding_size
            )));
        }
        Ok(size)
    }

    fn create_storage(&self, data: &[f32]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn create_storage_zeroed(&self, byte_size: u64) -> wgpu::Buffer {
        // wgpu zero-initialises new buffers.
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_uniform<T: Pod>(&self, data: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::bytes_of(data),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn make_gpu_buffer(
        &self,
        buffer: wgpu::Buffer,
        dims: Dims3,
        element_type: ElementType,
    ) -> DeviceBuffer {
        DeviceBuffer::new(
            BufferInner::Wgpu {
                buffer,
                device: Arc::clone(&self.device),
                queue: Arc::clone(&self.queue),
            },
            dims,
            element_type,
        )
    }

    fn download_f32(&self, buf: &DeviceBuffer) -> Result<Vec<f32>> {
        let (buffer, device, queue) = gpu_parts(buf)?;
        read_back(buffer, device, queue)
    }

    fn download_array(&self, buf: &DeviceBuffer) -> Result<Array3<f32>> {
        let data = self.download_f32(buf)?;
        Array3::from_shape_vec(buf.dims().shape(), data)
            .map_err(|e| DeconError::DeviceResource(e.to_string()))
    }

    /// Overwrite a device buffer with host data of the same dims.
    fn write_array(&self, dst: &DeviceBuffer, data: &Array3<f32>) -> Result<()> {
        let buffer = gpu_buf(dst)?;
        let data = data.as_standard_layout();
        let slice = data
            .as_slice()
            .ok_or_else(|| DeconError::DeviceResource("host array is not contiguous".into()))?;
        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(slice));
        Ok(())
    }

    /// Dispatch a single compute pass with one bind group at group(0).
    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        entries: &[wgpu::BindGroupEntry],
        workgroups: (u32, u32, u32),
    ) {
        let layout = pipeline.get_bind_group_layout(0);
        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries,
        });
        let mut enc = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = enc.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bg, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.queue.submit(std::iter::once(enc.finish()));
    }

    /// Copy a `block`-sized region from `src` at `src_at` to `dst` at `dst_at`.
    fn block_copy(
        &self,
        src: &DeviceBuffer,
        src_at: Offset3,
        dst: &DeviceBuffer,
        dst_at: Offset3,
        block: Dims3,
    ) -> Result<()> {
        let s = src.dims();
        let d = dst.dims();
        let params = self.create_uniform(&BlockCopyParams {
            src_w: to_u32(s.width, "width")?,
            src_h: to_u32(s.height, "height")?,
            src_x: to_u32(src_at.x, "offset")?,
            src_y: to_u32(src_at.y, "offset")?,
            src_z: to_u32(src_at.z, "offset")?,
            dst_w: to_u32(d.width, "width")?,
            dst_h: to_u32(d.height, "height")?,
            dst_x: to_u32(dst_at.x, "offset")?,
            dst_y: to_u32(dst_at.y, "offset")?,
            dst_z: to_u32(dst_at.z, "offset")?,
            block_w: to_u32(block.width, "width")?,
            block_h: to_u32(block.height, "height")?,
            block_d: to_u32(block.depth, "depth")?,
            _pad: [0; 3],
        });
        self.dispatch(
            &self.block_copy_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: gpu_buf(src)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: gpu_buf(dst)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
            (
                div_ceil(block.width as u32, 8),
                div_ceil(block.height as u32, 8),
                div_ceil(block.depth as u32, 4),
            ),
        );
        Ok(())
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn create(&self, dims: Dims3, element_type: ElementType) -> Result<DeviceBuffer> {
        let size = self.byte_size(dims)?;
        let buffer = self.create_storage_zeroed(size);
        Ok(self.make_gpu_buffer(buffer, dims, element_type))
    }

    fn release(&self, buffer: &mut DeviceBuffer) {
        if let BufferInner::Wgpu { buffer: b, .. } = &buffer.inner {
            b.destroy();
        }
        buffer.mark_released();
    }

    fn upload(&self, volume: &Volume) -> Result<DeviceBuffer> {
        let dims = volume.dims();
        self.byte_size(dims)?;
        let data = volume.data.as_standard_layout();
        let slice = data
            .as_slice()
            .ok_or_else(|| DeconError::DeviceResource("host array is not contiguous".into()))?;
        let buffer = self.create_storage(slice);
        Ok(self.make_gpu_buffer(buffer, dims, volume.element_type))
    }

    fn download(&self, buffer: &DeviceBuffer) -> Result<Array3<f32>> {
        self.download_array(buffer)
    }

    fn convert_to_f32(&self, src: &DeviceBuffer) -> Result<DeviceBuffer> {
        let mut dst = self.create(src.dims(), ElementType::F32)?;
        if let Err(e) = self.copy(src, &mut dst) {
            self.release(&mut dst);
            return Err(e);
        }
        Ok(dst)
    }

    fn copy(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer) -> Result<()> {
        ensure_same_dims("copy", src, dst)?;
        let (s, d) = (gpu_buf(src)?, gpu_buf(dst)?);
        let mut enc = self.device.create_command_encoder(&Default::default());
        enc.copy_buffer_to_buffer(s, 0, d, 0, s.size());
        self.queue.submit(std::iter::once(enc.finish()));
        Ok(())
    }

    fn crop(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()> {
        let block = dst.dims();
        ensure_fits("crop", &block, offset, &src.dims())?;
        self.block_copy(src, offset, dst, Offset3::ORIGIN, block)
    }

    fn paste(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()> {
        let block = src.dims();
        ensure_fits("paste", &block, offset, &dst.dims())?;
        self.block_copy(src, Offset3::ORIGIN, dst, offset, block)
    }

    /// Each workgroup reduces 256 voxels on the device; only the partial
    /// sums are read back and added in f64.
    fn sum_of_all_voxels(&self, buffer: &DeviceBuffer) -> Result<f64> {
        let count = to_u32(buffer.dims().voxel_count(), "voxel count")?;
        let (grid, row_stride) = linear_grid(count);
        let partial_count = grid.0 as u64 * grid.1 as u64;
        let partials = self.create_storage_zeroed(partial_count * std::mem::size_of::<f32>() as u64);
        let params = self.create_uniform(&ElementwiseParams {
            count,
            row_stride,
            value: 0.0,
            _pad: 0,
        });
        self.dispatch(
            &self.sum_partials_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: gpu_buf(buffer)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: partials.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
            grid,
        );
        let sums = read_back(&partials, &self.device, &self.queue);
        partials.destroy();
        Ok(sums?.iter().map(|&v| v as f64).sum())
    }

    fn multiply_scalar(
        &self,
        src: &DeviceBuffer,
        dst: &mut DeviceBuffer,
        factor: f32,
    ) -> Result<()> {
        ensure_same_dims("multiply_scalar", src, dst)?;
        let count = to_u32(src.dims().voxel_count(), "voxel count")?;
        let (grid, row_stride) = linear_grid(count);
        let params = self.create_uniform(&ElementwiseParams {
            count,
            row_stride,
            value: factor,
            _pad: 0,
        });
        self.dispatch(
            &self.scale_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: gpu_buf(src)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: gpu_buf(dst)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
            grid,
        );
        Ok(())
    }

    fn fill(&self, buffer: &mut DeviceBuffer, value: f32) -> Result<()> {
        let count = to_u32(buffer.dims().voxel_count(), "voxel count")?;
        let (grid, row_stride) = linear_grid(count);
        let params = self.create_uniform(&ElementwiseParams {
            count,
            row_stride,
            value,
            _pad: 0,
        });
        self.dispatch(
            &self.fill_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: gpu_buf(buffer)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
            ],
            grid,
        );
        Ok(())
    }

    fn convolve_circular(
        &self,
        image: &DeviceBuffer,
        kernel: &DeviceBuffer,
        dst: &mut DeviceBuffer,
    ) -> Result<()> {
        ensure_same_dims("convolve", image, kernel)?;
        ensure_same_dims("convolve", image, dst)?;
        let result = fft3d::convolve_circular(
            &self.download_array(image)?,
            &self.download_array(kernel)?,
        );
        self.write_array(dst, &result)
    }

    fn run_iterations(&self, request: IterationRequest<'_>) -> Result<()> {
        request.validate()?;
        let image = self.download_array(request.image)?;
        let kernel = self.download_array(request.kernel)?;
        let normalization = request
            .normalization
            .map(|n| self.download_array(n))
            .transpose()?;
        let mut estimate = self.download_array(request.estimate)?;

        let inputs = RichardsonLucyInputs {
            image: &image,
            kernel: &kernel,
            normalization: normalization.as_ref(),
            iterations: request.iterations,
            regularization: request.regularization,
        };
        richardson_lucy::run_iterations(&inputs, &mut estimate);
        self.write_array(request.estimate, &estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_grid_folds_large_counts() {
        let ((x, y, z), stride) = linear_grid(100);
        assert_eq!((x, y, z), (1, 1, 1));
        assert_eq!(stride, 256);

        let count = 256 * 70_000;
        let ((x, y, _), stride) = linear_grid(count);
        assert_eq!(x, MAX_WORKGROUPS_PER_DIM);
        assert!(x as u64 * y as u64 * 256 >= count as u64);
        assert_eq!(stride, MAX_WORKGROUPS_PER_DIM * 256);
    }
}
