//! Depth-texture shadow mapping.
//!
//! Populated tiles are rendered from the shadow camera into a
//! [`ShadowTarget`], storing a logarithmic depth per texel. The color pass
//! then receives each tile's light-space matrix and compares every
//! fragment's own log depth against the stored one.

use std::collections::HashMap;

use glam::{DMat4, DVec2, DVec3};

use crate::types::TileId;

/// Depth bias applied before comparing against the stored depth.
pub const SHADOW_BIAS: f64 = 0.005;

/// Light factor of an occluded fragment.
pub const SHADOWED_LIGHT: f64 = 0.2;

/// Texel filtering of the shadow target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

/// Format of the shadow target's color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Rgba32Float,
}

/// Description of the offscreen target the shadow pass renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowTarget {
    pub width: u32,
    pub height: u32,
    pub filter: TextureFilter,
    pub format: TargetFormat,
    /// Whether a depth attachment is bound alongside the color target.
    pub depth_attachment: bool,
}

impl ShadowTarget {
    /// A square float target with nearest filtering and a depth attachment.
    #[must_use]
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            filter: TextureFilter::Nearest,
            format: TargetFormat::Rgba32Float,
            depth_attachment: true,
        }
    }
}

impl Default for ShadowTarget {
    fn default() -> Self {
        Self::square(512)
    }
}

/// Logarithmic depth of a fragment with clip-space `w` for a camera with
/// far plane `far`. Monotonic in `w`, zero at the eye and one at `far`.
#[must_use]
pub fn log_depth(clip_w: f64, far: f64) -> f64 {
    (1.0 + clip_w.max(0.0)).ln() / (1.0 + far).ln()
}

/// Light factor of `position` (tile-local) given the tile's light-space
/// matrix and a lookup into the stored depths by texture coordinate.
///
/// Positions projecting outside the shadow map, or behind the shadow
/// camera, are fully lit.
pub fn shadow_visibility(
    light_space: &DMat4,
    position: DVec3,
    far: f64,
    stored_depth: impl Fn(DVec2) -> f64,
) -> f64 {
    let clip = *light_space * position.extend(1.0);
    if clip.w <= 0.0 {
        return 1.0;
    }
    let ndc = clip.truncate() / clip.w;
    let uv = ndc.truncate() * 0.5 + DVec2::splat(0.5);
    if uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 {
        return 1.0;
    }

    let current = log_depth(clip.w, far);
    if current - SHADOW_BIAS > stored_depth(uv) {
        SHADOWED_LIGHT
    } else {
        1.0
    }
}

/// Uniforms of the shadow depth material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowDepthMaterial {
    pub light_space: DMat4,
    pub far: f64,
}

/// Uniforms of the shadow comparison material used in the color pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCompareMaterial {
    pub light_space: DMat4,
    pub far: f64,
    pub bias: f64,
    pub shadowed_light: f64,
}

/// Results of one frame's shadow pass.
#[derive(Debug, Clone, Default)]
pub struct ShadowMap {
    pub target: ShadowTarget,
    pub view_projection: DMat4,
    pub far: f64,
    light_space: HashMap<TileId, DMat4>,
}

impl ShadowMap {
    #[must_use]
    pub fn new(target: ShadowTarget, view_projection: DMat4, far: f64) -> Self {
        Self {
            target,
            view_projection,
            far,
            light_space: HashMap::new(),
        }
    }

    /// Record and return the light-space matrix of a tile with world matrix
    /// `tile_world`.
    pub fn record(&mut self, tile: TileId, tile_world: DMat4) -> DMat4 {
        let light_space = self.view_projection * tile_world;
        self.light_space.insert(tile, light_space);
        light_space
    }

    /// Light-space matrix recorded for `tile` this frame.
    #[must_use]
    pub fn light_space(&self, tile: TileId) -> Option<DMat4> {
        self.light_space.get(&tile).copied()
    }

    /// Depth material for drawing `tile` into the shadow target.
    #[must_use]
    pub fn depth_material(&self, tile: TileId) -> Option<ShadowDepthMaterial> {
        self.light_space(tile).map(|light_space| ShadowDepthMaterial {
            light_space,
            far: self.far,
        })
    }

    /// Comparison material for drawing `tile` in the color pass.
    #[must_use]
    pub fn compare_material(&self, tile: TileId) -> Option<ShadowCompareMaterial> {
        self.light_space(tile).map(|light_space| ShadowCompareMaterial {
            light_space,
            far: self.far,
            bias: SHADOW_BIAS,
            shadowed_light: SHADOWED_LIGHT,
        })
    }

    pub fn clear(&mut self) {
        self.light_space.clear();
    }
}

/// Shader writing log depth into the shadow target.
pub const SHADOW_DEPTH_WGSL: &str = r"
struct Uniforms {
    light_space: mat4x4<f32>,
    model: mat4x4<f32>,
    far: f32,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) depth: f32,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u.light_space * u.model * vec4<f32>(position, 1.0);
    out.depth = log(1.0 + max(out.clip.w, 0.0)) / log(1.0 + u.far);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.depth, in.depth, in.depth, 1.0);
}
";

/// Shader darkening fragments occluded in the shadow target.
pub const SHADOW_COMPARE_WGSL: &str = r"
struct Uniforms {
    projection: mat4x4<f32>,
    light_space: mat4x4<f32>,
    model: mat4x4<f32>,
    color: vec4<f32>,
    far: f32,
    bias: f32,
    shadowed_light: f32,
};

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var shadow_map: texture_2d<f32>;
@group(0) @binding(2) var shadow_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) light_clip: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    let local = u.model * vec4<f32>(position, 1.0);
    out.clip = u.projection * local;
    out.light_clip = u.light_space * local;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var light = 1.0;
    if (in.light_clip.w > 0.0) {
        let ndc = in.light_clip.xyz / in.light_clip.w;
        let uv = ndc.xy * 0.5 + vec2<f32>(0.5, 0.5);
        if (all(uv >= vec2<f32>(0.0, 0.0)) && all(uv <= vec2<f32>(1.0, 1.0))) {
            let stored = textureSample(shadow_map, shadow_sampler, uv).r;
            let current = log(1.0 + in.light_clip.w) / log(1.0 + u.far);
            if (current - u.bias > stored) {
                light = u.shadowed_light;
            }
        }
    }
    return vec4<f32>(u.color.rgb * light, u.color.a);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_depth_range() {
        assert_eq!(log_depth(0.0, 1000.0), 0.0);
        assert!((log_depth(1000.0, 1000.0) - 1.0).abs() < 1e-12);
        assert!(log_depth(10.0, 1000.0) < log_depth(20.0, 1000.0));
        assert_eq!(log_depth(-5.0, 1000.0), 0.0);
    }

    #[test]
    fn test_visibility_outside_map_is_lit() {
        let m = DMat4::IDENTITY;
        // x = 2 projects to u = 1.5.
        let light = shadow_visibility(&m, DVec3::new(2.0, 0.0, 0.0), 100.0, |_| 0.0);
        assert!((light - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_visibility_occluded_and_lit() {
        // Orthographic with w = 50: current depth is log(51) / log(101).
        let m = DMat4::from_cols(
            DVec3::X.extend(0.0) * 50.0,
            DVec3::Y.extend(0.0) * 50.0,
            DVec3::Z.extend(0.0) * 50.0,
            glam::DVec4::new(0.0, 0.0, 0.0, 50.0),
        );
        let p = DVec3::ZERO;
        let current = log_depth(50.0, 100.0);

        let occluded = shadow_visibility(&m, p, 100.0, |_| current - 0.1);
        assert!((occluded - SHADOWED_LIGHT).abs() < f64::EPSILON);

        // Within the bias counts as lit.
        let biased = shadow_visibility(&m, p, 100.0, |_| current - SHADOW_BIAS * 0.5);
        assert!((biased - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_visibility_samples_projected_uv() {
        let m = DMat4::IDENTITY;
        let seen = std::cell::Cell::new(DVec2::ZERO);
        shadow_visibility(&m, DVec3::new(0.5, -0.5, 0.0), 10.0, |uv| {
            seen.set(uv);
            1.0
        });
        assert_eq!(seen.get(), DVec2::new(0.75, 0.25));
    }

    #[test]
    fn test_shadow_map_records_per_tile() {
        let vp = DMat4::from_scale(DVec3::splat(2.0));
        let mut map = ShadowMap::new(ShadowTarget::default(), vp, 500.0);
        let tile = TileId::new(16, 1, 2);
        let world = DMat4::from_translation(DVec3::X);

        let light_space = map.record(tile, world);
        assert_eq!(light_space, vp * world);
        assert_eq!(map.light_space(tile), Some(vp * world));
        assert_eq!(map.compare_material(tile).unwrap().bias, SHADOW_BIAS);
        assert!(map.light_space(TileId::new(16, 0, 0)).is_none());

        map.clear();
        assert!(map.depth_material(tile).is_none());
    }

    #[test]
    fn test_default_target() {
        let target = ShadowTarget::default();
        assert_eq!((target.width, target.height), (512, 512));
        assert_eq!(target.filter, TextureFilter::Nearest);
        assert!(target.depth_attachment);
    }
}
