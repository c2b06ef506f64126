use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::error::{ImageError, Result};
use crate::format::{DestFormat, UploadParams};

use super::blocks::decode_blocks;
use super::{
    expand_to_rgba8, Filter, MinFilter, Sampling, TextureBackend, TextureExtent, TextureId, Wrap,
};

const BLIT_SHADER: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn fs_copy(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {
    return textureLoad(source, vec2<i32>(position.xy), 0);
}

@fragment
fn fs_copy_opaque(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(textureLoad(source, vec2<i32>(position.xy), 0).rgb, 1.0);
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WgpuBackendOptions {
    pub power_preference: GpuPowerPreference,
}

/// Headless wgpu device implementing the texture contract.
///
/// Block-compressed levels stay compressed on the GPU when the adapter
/// supports BC and the base level is block aligned; everything else is
/// widened to RGBA8 before upload. Readback of compressed storage renders the
/// level into an RGBA8 target so the GPU does the decoding.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    bc_supported: bool,
    blit: BlitPipelines,
    next_id: Cell<u64>,
    slots: RefCell<HashMap<TextureId, Slot>>,
}

struct BlitPipelines {
    layout: wgpu::BindGroupLayout,
    copy: wgpu::RenderPipeline,
    copy_opaque: wgpu::RenderPipeline,
}

#[derive(Default)]
struct Slot {
    storage: Option<Storage>,
    sampler: Option<wgpu::Sampler>,
}

struct Storage {
    texture: wgpu::Texture,
    extent: TextureExtent,
    dest: DestFormat,
    native_blocks: bool,
    written: Vec<bool>,
}

impl WgpuBackend {
    pub fn new(options: WgpuBackendOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power_preference {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| ImageError::gpu(format!("failed to find a suitable GPU adapter: {err}")))?;

        let adapter_info = adapter.get_info();
        let bc_supported = adapter
            .features()
            .contains(wgpu::Features::TEXTURE_COMPRESSION_BC);
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            bc_supported,
            "selected GPU adapter"
        );

        let mut required_features = wgpu::Features::empty();
        if bc_supported {
            required_features |= wgpu::Features::TEXTURE_COMPRESSION_BC;
        }
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("texlens device"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| ImageError::gpu(format!("failed to create GPU device: {err}")))?;

        let blit = BlitPipelines::new(&device);
        Ok(Self {
            device,
            queue,
            adapter_name: adapter_info.name,
            bc_supported,
            blit,
            next_id: Cell::new(0),
            slots: RefCell::new(HashMap::new()),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// View over every level of `id` plus its sampler, for binding in a
    /// render pass.
    pub fn view_and_sampler(&self, id: TextureId) -> Option<(wgpu::TextureView, wgpu::Sampler)> {
        let slots = self.slots.borrow();
        let slot = slots.get(&id)?;
        let storage = slot.storage.as_ref()?;
        let view = storage
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Some((view, slot.sampler.clone()?))
    }

    fn with_slot<T>(&self, id: TextureId, f: impl FnOnce(&mut Slot) -> Result<T>) -> Result<T> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots
            .get_mut(&id)
            .ok_or_else(|| ImageError::gpu(format!("{id} is not a live texture")))?;
        f(slot)
    }

    fn native_format(dest: DestFormat) -> Option<wgpu::TextureFormat> {
        match dest {
            DestFormat::Bc1Rgb | DestFormat::Bc1Rgba => Some(wgpu::TextureFormat::Bc1RgbaUnorm),
            DestFormat::Bc2 => Some(wgpu::TextureFormat::Bc2RgbaUnorm),
            DestFormat::Bc3 => Some(wgpu::TextureFormat::Bc3RgbaUnorm),
            _ => None,
        }
    }

    fn block_bytes(dest: DestFormat) -> u32 {
        match dest {
            DestFormat::Bc1Rgb | DestFormat::Bc1Rgba => 8,
            _ => 16,
        }
    }

    /// Copies `width` x `height` RGBA8 texels of `texture`'s `level` into
    /// tightly packed rows.
    fn copy_out(&self, texture: &wgpu::Texture, level: u32, width: u32, height: u32) -> Result<Vec<u8>> {
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texlens readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texlens readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| ImageError::gpu(format!("device poll failed: {err}")))?;
        rx.recv()
            .map_err(|err| ImageError::gpu(format!("readback channel closed: {err}")))?
            .map_err(|err| ImageError::gpu(format!("failed to map readback buffer: {err}")))?;

        let mapped = slice.get_mapped_range();
        let mut texels = Vec::with_capacity((unpadded * height) as usize);
        for row in mapped.chunks(padded as usize).take(height as usize) {
            texels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(texels)
    }

    /// Renders one compressed level into a scratch RGBA8 target and reads
    /// the target back.
    fn decode_level(&self, storage: &Storage, level: u32) -> Result<Vec<u8>> {
        let (width, height) = storage.extent.level_size(level);
        let target = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texlens decode target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let source_view = storage.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("texlens decode source"),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texlens decode bind group"),
            layout: &self.blit.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&source_view),
            }],
        });
        let pipeline = if storage.dest.is_opaque() {
            &self.blit.copy_opaque
        } else {
            &self.blit.copy
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texlens decode encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("texlens decode pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.copy_out(&target, 0, width, height)
    }
}

impl BlitPipelines {
    fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("texlens blit shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(BLIT_SHADER)),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texlens blit layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("texlens blit pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let build = |entry_point: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("texlens blit pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        };

        Self {
            copy: build("fs_copy"),
            copy_opaque: build("fs_copy_opaque"),
            layout,
        }
    }
}

impl TextureBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&self) -> Result<TextureId> {
        let raw = self.next_id.get() + 1;
        self.next_id.set(raw);
        let id = TextureId::new(
            NonZeroU64::new(raw).ok_or_else(|| ImageError::gpu("texture ids exhausted"))?,
        );
        self.slots.borrow_mut().insert(id, Slot::default());
        Ok(id)
    }

    fn define_storage(&self, id: TextureId, extent: TextureExtent, dest: DestFormat) -> Result<()> {
        if extent.width == 0 || extent.height == 0 || extent.mip_levels == 0 {
            return Err(ImageError::gpu(format!(
                "cannot define empty storage {}x{} with {} levels",
                extent.width, extent.height, extent.mip_levels
            )));
        }
        let limits = self.device.limits();
        if extent.width > limits.max_texture_dimension_2d
            || extent.height > limits.max_texture_dimension_2d
        {
            return Err(ImageError::gpu(format!(
                "GPU max texture dimension is {}, requested {}x{}",
                limits.max_texture_dimension_2d, extent.width, extent.height
            )));
        }

        let native = Self::native_format(dest).filter(|_| {
            self.bc_supported && extent.width % 4 == 0 && extent.height % 4 == 0
        });
        if dest.is_compressed() && native.is_none() {
            tracing::debug!(%id, ?dest, "decoding compressed storage on the CPU");
        }
        let format = native.unwrap_or(wgpu::TextureFormat::Rgba8Unorm);
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if native.is_none() {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texlens texture"),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: extent.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        self.with_slot(id, |slot| {
            slot.storage = Some(Storage {
                texture,
                extent,
                dest,
                native_blocks: native.is_some(),
                written: vec![false; extent.mip_levels as usize],
            });
            Ok(())
        })
    }

    fn set_sampling(&self, id: TextureId, sampling: Sampling) -> Result<()> {
        let address_mode = match sampling.wrap {
            Wrap::Repeat => wgpu::AddressMode::Repeat,
            Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        };
        let mag_filter = match sampling.mag {
            Filter::Nearest => wgpu::FilterMode::Nearest,
            Filter::Linear => wgpu::FilterMode::Linear,
        };
        let mipmap_filter = match sampling.min {
            MinFilter::Linear => wgpu::FilterMode::Nearest,
            MinFilter::LinearMipmapLinear => wgpu::FilterMode::Linear,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("texlens sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter,
            ..Default::default()
        });
        self.with_slot(id, |slot| {
            slot.sampler = Some(sampler);
            Ok(())
        })
    }

    fn write_level(
        &self,
        id: TextureId,
        level: u32,
        width: u32,
        height: u32,
        params: &UploadParams,
        data: &[u8],
    ) -> Result<()> {
        self.with_slot(id, |slot| {
            let storage = slot
                .storage
                .as_mut()
                .ok_or_else(|| ImageError::gpu(format!("{id} has no storage defined")))?;
            if level >= storage.extent.mip_levels {
                return Err(ImageError::gpu(format!(
                    "level {level} outside the {} defined for {id}",
                    storage.extent.mip_levels
                )));
            }
            if storage.extent.level_size(level) != (width, height) {
                return Err(ImageError::gpu(format!(
                    "level {level} of {id} is {:?}, upload is {width}x{height}",
                    storage.extent.level_size(level)
                )));
            }
            if params.dest_format != storage.dest {
                return Err(ImageError::gpu(format!(
                    "upload targets {:?} but {id} stores {:?}",
                    params.dest_format, storage.dest
                )));
            }

            let destination = wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            };
            if storage.native_blocks {
                let blocks_wide = width.div_ceil(4);
                let blocks_high = height.div_ceil(4);
                let row_bytes = blocks_wide * Self::block_bytes(storage.dest);
                let needed = (row_bytes * blocks_high) as usize;
                if data.len() < needed {
                    return Err(ImageError::gpu(format!(
                        "compressed payload holds {} bytes, {width}x{height} needs {needed}",
                        data.len()
                    )));
                }
                self.queue.write_texture(
                    destination,
                    &data[..needed],
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(row_bytes),
                        rows_per_image: Some(blocks_high),
                    },
                    wgpu::Extent3d {
                        width: blocks_wide * 4,
                        height: blocks_high * 4,
                        depth_or_array_layers: 1,
                    },
                );
            } else {
                let texels = if params.compressed {
                    decode_blocks(storage.dest, width, height, data)?
                } else {
                    expand_to_rgba8(params, width, height, data)?
                };
                self.queue.write_texture(
                    destination,
                    &texels,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(width * 4),
                        rows_per_image: Some(height),
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            storage.written[level as usize] = true;
            Ok(())
        })
    }

    fn read_level_rgba8(&self, id: TextureId, level: u32) -> Result<Vec<u8>> {
        let slots = self.slots.borrow();
        let storage = slots
            .get(&id)
            .and_then(|slot| slot.storage.as_ref())
            .filter(|storage| storage.written.get(level as usize).copied().unwrap_or(false))
            .ok_or_else(|| ImageError::gpu(format!("level {level} of {id} was never written")))?;

        if storage.native_blocks {
            self.decode_level(storage, level)
        } else {
            let (width, height) = storage.extent.level_size(level);
            self.copy_out(&storage.texture, level, width, height)
        }
    }

    fn delete_texture(&self, id: TextureId) {
        if let Some(slot) = self.slots.borrow_mut().remove(&id) {
            if let Some(storage) = slot.storage {
                storage.texture.destroy();
            }
        }
    }

    fn live_textures(&self) -> usize {
        self.slots.borrow().len()
    }
}
