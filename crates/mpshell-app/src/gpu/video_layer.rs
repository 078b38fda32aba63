use bytemuck::{Pod, Zeroable};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BufferBindingType, ColorTargetState,
    CommandEncoder, Device, FragmentState, PipelineCompilationOptions, PipelineLayoutDescriptor,
    PrimitiveState, Queue, RenderPipeline, SamplerBindingType, ShaderStages, TextureFormat,
    TextureSampleType, TextureView, TextureViewDimension, VertexState,
};

use crate::frame::{FrameBuffer, FrameExchange};
use crate::renderer::types::DisplaySize;

const VIDEO_BLIT_WGSL: &str = include_str!("../../../../assets/shaders/video_blit.wgsl");

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct VideoUniforms {
    pub scale: [f32; 2],
    pub offset: [f32; 2],
    pub visible: f32,
    _pad: f32,
}

impl VideoUniforms {
    fn hidden() -> Self {
        Self {
            scale: [1.0, 1.0],
            offset: [0.0, 0.0],
            visible: 0.0,
            _pad: 0.0,
        }
    }
}

struct FrameTexture {
    texture: wgpu::Texture,
    view: TextureView,
    width: u32,
    height: u32,
}

impl FrameTexture {
    fn new(device: &Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("video-frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            // sRGB so sampling yields linear values
            format: TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    fn upload(&self, queue: &Queue, pixels: &[u8]) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// GPU side of the frame buffer layer: one texture holding the latest frame,
/// drawn letterboxed into the window surface once per composite pass.
pub struct VideoLayer {
    frame: FrameTexture,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    bind_group_layout: BindGroupLayout,
    bind_group: BindGroup,
    pipeline: RenderPipeline,
    display: Option<DisplaySize>,
    /// Session whose frames match `display`.
    generation: Option<u64>,
    viewport: (u32, u32),
    has_frame: bool,
}

impl VideoLayer {
    pub fn new(
        device: &Device,
        queue: &Queue,
        surface_format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let frame = FrameTexture::new(device, 1, 1);
        frame.upload(queue, &[0, 0, 0, 255]);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("video-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("video-uniforms"),
            size: std::mem::size_of::<VideoUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&VideoUniforms::hidden()));

        // texture(0), sampler(1), uniforms(2)
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("video-blit-bgl"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<VideoUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("video-blit"),
            source: wgpu::ShaderSource::Wgsl(VIDEO_BLIT_WGSL.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("video-blit-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("video-blit-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &shader_module,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: PipelineCompilationOptions::default(),
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let bind_group =
            create_bind_group(device, &bind_group_layout, &frame.view, &sampler, &uniform_buffer);

        Self {
            frame,
            sampler,
            uniform_buffer,
            bind_group_layout,
            bind_group,
            pipeline,
            display: None,
            generation: None,
            viewport: (width.max(1), height.max(1)),
            has_frame: false,
        }
    }

    /// A new stream started with this display geometry.
    pub fn set_display_size(&mut self, queue: &Queue, display: DisplaySize, generation: u64) {
        self.display = Some(display);
        self.generation = Some(generation);
        // frames of the previous stream must not be shown with the new geometry
        self.has_frame = false;
        self.write_uniforms(queue);
    }

    /// Hide the video; the surface draws black until the next stream.
    pub fn clear(&mut self, queue: &Queue) {
        self.display = None;
        self.generation = None;
        self.has_frame = false;
        self.write_uniforms(queue);
    }

    pub fn resize(&mut self, queue: &Queue, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
        self.write_uniforms(queue);
    }

    /// Upload the newest frame of the current session, if any. Returns whether one was taken.
    pub fn present_latest(
        &mut self,
        device: &Device,
        queue: &Queue,
        exchange: &FrameExchange,
    ) -> bool {
        let Some(generation) = self.generation else {
            return false;
        };
        let Some(frame) = exchange.take_for(generation) else {
            return false;
        };
        self.upload(device, queue, &frame);
        exchange.recycle(frame);
        true
    }

    fn upload(&mut self, device: &Device, queue: &Queue, frame: &FrameBuffer) {
        if (self.frame.width, self.frame.height) != (frame.width, frame.height) {
            log::debug!("Video texture resized to {}x{}", frame.width, frame.height);
            self.frame = FrameTexture::new(device, frame.width, frame.height);
            self.bind_group = create_bind_group(
                device,
                &self.bind_group_layout,
                &self.frame.view,
                &self.sampler,
                &self.uniform_buffer,
            );
        }
        self.frame.upload(queue, &frame.pixels);
        if !self.has_frame {
            self.has_frame = true;
            self.write_uniforms(queue);
        }
    }

    pub fn is_showing(&self) -> bool {
        self.display.is_some() && self.has_frame
    }

    /// Draw callback for one composite pass.
    pub fn draw(&self, encoder: &mut CommandEncoder, target: &TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("video-blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if self.is_showing() {
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    fn write_uniforms(&self, queue: &Queue) {
        let uniforms = match self.display {
            Some(display) if self.has_frame => {
                compute_letterbox(display, self.viewport.0, self.viewport.1)
            }
            _ => VideoUniforms::hidden(),
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }
}

fn create_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    view: &TextureView,
    sampler: &wgpu::Sampler,
    uniforms: &wgpu::Buffer,
) -> BindGroup {
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("video-blit-bg"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(view),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(sampler),
            },
            BindGroupEntry {
                binding: 2,
                resource: uniforms.as_entire_binding(),
            },
        ],
    })
}

/// Fit the display rect into the viewport, centred, bars on the short axis.
pub fn compute_letterbox(display: DisplaySize, viewport_w: u32, viewport_h: u32) -> VideoUniforms {
    let display_aspect = display.aspect() as f32;
    let viewport_aspect = viewport_w as f32 / viewport_h.max(1) as f32;

    let (scale_x, scale_y) = if display_aspect > viewport_aspect {
        (1.0, viewport_aspect / display_aspect)
    } else {
        (display_aspect / viewport_aspect, 1.0)
    };

    VideoUniforms {
        scale: [scale_x, scale_y],
        offset: [(1.0 - scale_x) * 0.5, (1.0 - scale_y) * 0.5],
        visible: 1.0,
        _pad: 0.0,
    }
}
