//! Shadow rendering.
//!
//! Two complementary techniques share the sun light:
//!
//! - [`planar`]: every model mesh is flattened onto the ground plane and
//!   drawn as a translucent stencil-tested shadow.
//! - [`map`]: populated tiles are rendered from a shadow camera built with
//!   the host's camera model ([`camera`]) into a log-depth target that the
//!   color pass samples.

pub mod camera;
pub mod map;
pub mod planar;

pub use camera::{CameraParams, host_camera_matrix, shadow_view_projection};
pub use map::{
    SHADOW_BIAS, ShadowCompareMaterial, ShadowDepthMaterial, ShadowMap, ShadowTarget, log_depth,
    shadow_visibility,
};
pub use planar::{PlanarShadowMaterial, caster_light, planar_shadow_matrix, update_casters};
