//! Single-page rectangle-packed image atlas backing decoded card images.
//!
//! Generalized from a glyph-page packer to decoded-image pages: unlike glyphs,
//! images are never evicted — a full page is a caller-visible
//! [`Error::ResourceExhausted`], since cards are expected to free an old image
//! before requesting a new one of a different size.

use crate::error::{Error, Result};

// Axis-aligned rectangle for the packer's free-space tracking.
#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

/// 2D rectangle bin packer using the Guillotine best-short-side-fit algorithm.
///
/// Reference: Jukka Jylanki, "A Thousand Ways to Pack the Bin" (2010).
pub struct RectPacker {
    width: u32,
    height: u32,
    free_rects: Vec<Rect>,
}

impl RectPacker {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, free_rects: vec![Rect { x: 0, y: 0, w: width, h: height }] }
    }

    /// Finds space for a rectangle of the given dimensions, splitting the
    /// chosen free rectangle along its shorter leftover axis on success.
    pub fn pack(&mut self, w: u32, h: u32) -> Option<(u32, u32)> {
        let mut best_idx = None;
        let mut best_short = u32::MAX;
        let mut best_long = u32::MAX;

        for (i, r) in self.free_rects.iter().enumerate() {
            if r.w >= w && r.h >= h {
                let leftover_w = r.w - w;
                let leftover_h = r.h - h;
                let short = leftover_w.min(leftover_h);
                let long = leftover_w.max(leftover_h);
                if short < best_short || (short == best_short && long < best_long) {
                    best_idx = Some(i);
                    best_short = short;
                    best_long = long;
                }
            }
        }

        let idx = best_idx?;
        let r = self.free_rects[idx];
        let pos = (r.x, r.y);

        self.free_rects.swap_remove(idx);
        let leftover_w = r.w - w;
        let leftover_h = r.h - h;

        if leftover_w < leftover_h {
            if leftover_w > 0 {
                self.free_rects.push(Rect { x: r.x + w, y: r.y, w: leftover_w, h });
            }
            if leftover_h > 0 {
                self.free_rects.push(Rect { x: r.x, y: r.y + h, w: r.w, h: leftover_h });
            }
        } else {
            if leftover_h > 0 {
                self.free_rects.push(Rect { x: r.x, y: r.y + h, w, h: leftover_h });
            }
            if leftover_w > 0 {
                self.free_rects.push(Rect { x: r.x + w, y: r.y, w: leftover_w, h: r.h });
            }
        }

        Some(pos)
    }

    pub fn reset(&mut self) {
        self.free_rects.clear();
        self.free_rects.push(Rect { x: 0, y: 0, w: self.width, h: self.height });
    }
}

/// Placement of one packed image within the atlas texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRegion {
    /// Normalized `[u, v, u_size, v_size]` for sampling within the atlas.
    pub fn uv(&self, atlas_size: u32) -> [f32; 4] {
        let s = atlas_size as f32;
        [self.x as f32 / s, self.y as f32 / s, self.width as f32 / s, self.height as f32 / s]
    }
}

/// A single square RGBA8 texture page that card images are packed into.
pub struct ImageAtlas {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    packer: RectPacker,
    size: u32,
}

impl ImageAtlas {
    pub fn create(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("card-image-atlas"),
            size: wgpu::Extent3d { width: size, height: size, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("card-image-atlas-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self { texture, view, sampler, packer: RectPacker::new(size, size), size }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Packs and uploads an RGBA8 image. Never evicts — a full atlas surfaces
    /// [`Error::ResourceExhausted`] for the caller to free older images first.
    pub fn upload(&mut self, queue: &wgpu::Queue, width: u32, height: u32, rgba: &[u8]) -> Result<AtlasRegion> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_argument("image atlas upload with zero width/height"));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() < expected {
            return Err(Error::invalid_argument("image atlas upload buffer shorter than width*height*4"));
        }
        let (x, y) = self.packer.pack(width, height).ok_or_else(|| Error::resource_exhausted("image atlas page is full"))?;

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );

        Ok(AtlasRegion { x, y, width, height })
    }
}
