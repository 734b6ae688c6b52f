//! Demo scenes plugged into the render manager.
//!
//! - `shadow`: directional shadow mapping with an FPS camera
//! - `mesh`: a textured model under the quaternion free camera
//! - `pbr`: a Cook-Torrance sphere under a point light

pub mod common;
pub mod mesh;
pub mod pbr;
pub mod shadow;

use tracing::info;

use vkdemo_core::DemoKind;
use vkdemo_renderer::{Demo, DemoContext, DemoController};
use vkdemo_rhi::RhiResult;

pub use mesh::MeshDemo;
pub use pbr::PbrDemo;
pub use shadow::ShadowDemo;

/// Build the demo selected in the configuration.
pub fn create_demo(kind: DemoKind, ctx: &DemoContext<'_>) -> RhiResult<Box<dyn DemoController>> {
    let demo: Box<dyn DemoController> = match kind {
        DemoKind::Shadow => Box::new(ShadowDemo::init(ctx)?),
        DemoKind::Mesh => Box::new(MeshDemo::init(ctx)?),
        DemoKind::Pbr => Box::new(PbrDemo::init(ctx)?),
    };
    info!("Created demo '{}'", demo.name());
    Ok(demo)
}
