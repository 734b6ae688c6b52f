//! Frame loop behaviour without a GPU: synchronizer, dynamic uniforms and
//! the pass graph driven together through their trait seams.

use std::mem::size_of;

use glam::Mat4;

use vkdemo_renderer::{
    Access, CompiledPass, DynamicUniformBuffer, FrameBackend, FrameSynchronizer, GraphBuilder,
    ImageBarrier, PassDesc, PassRecorder, ResourceKind, UniformMemory, compute_stride,
};
use vkdemo_rhi::vk;
use vkdemo_rhi::{RhiError, RhiResult};

/// Plain host bytes standing in for a mapped, non-coherent buffer.
struct HostMemory {
    bytes: Vec<u8>,
    flushed: std::cell::RefCell<Vec<(u64, u64)>>,
}

impl HostMemory {
    fn new(size: u64) -> Self {
        Self {
            bytes: vec![0; size as usize],
            flushed: Default::default(),
        }
    }
}

impl UniformMemory for HostMemory {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> RhiResult<()> {
        let start = offset as usize;
        let dst = self
            .bytes
            .get_mut(start..start + bytes.len())
            .ok_or(RhiError::OutOfBounds {
                offset,
                size: bytes.len() as u64,
                capacity: 0,
            })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self, offset: u64, size: u64) -> RhiResult<&[u8]> {
        let start = offset as usize;
        self.bytes
            .get(start..start + size as usize)
            .ok_or(RhiError::OutOfBounds {
                offset,
                size,
                capacity: self.bytes.len() as u64,
            })
    }

    fn is_coherent(&self) -> bool {
        false
    }

    fn flush(&self, offset: u64, size: u64) -> RhiResult<()> {
        self.flushed.borrow_mut().push((offset, size));
        Ok(())
    }
}

/// Fences that retire immediately; images handed out round-robin.
#[derive(Default)]
struct InstantBackend {
    images: u32,
    next_image: u32,
    submitted: Vec<(usize, u32)>,
}

impl FrameBackend for InstantBackend {
    fn wait_fence(&mut self, _slot: usize, _timeout_ns: u64) -> RhiResult<()> {
        Ok(())
    }

    fn reset_fence(&mut self, _slot: usize) -> RhiResult<()> {
        Ok(())
    }

    fn acquire_image(&mut self, _slot: usize, _timeout_ns: u64) -> RhiResult<(u32, bool)> {
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.images;
        Ok((image, false))
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.submitted.push((slot, image_index));
        Ok(())
    }

    fn present(&mut self, _slot: usize, _image_index: u32) -> RhiResult<bool> {
        Ok(false)
    }
}

#[test]
fn test_three_frames_upload_distinct_view_projections() {
    const FRAMES: usize = 3;
    let stride = compute_stride(size_of::<Mat4>() as u64, 256);
    assert_eq!(size_of::<Mat4>(), 64);
    assert_eq!(stride, 256);

    let memory = HostMemory::new(stride * FRAMES as u64);
    let mut uniforms = DynamicUniformBuffer::<Mat4, _>::with_memory(memory, FRAMES, stride).unwrap();
    let backend = InstantBackend {
        images: 2,
        ..Default::default()
    };
    let mut sync = FrameSynchronizer::new(backend, FRAMES, u64::MAX);

    for frame in 0..FRAMES {
        sync.begin_frame().unwrap();
        let slot = sync.current_slot();
        assert_eq!(slot, frame);
        uniforms
            .upload(slot, &Mat4::from_diagonal(glam::Vec4::splat(frame as f32 + 1.0)))
            .unwrap();
        sync.submit().unwrap();
        assert!(!sync.present().unwrap());
        sync.advance();
    }

    assert_eq!(uniforms.read_back(1).unwrap(), Mat4::from_diagonal(glam::Vec4::splat(2.0)));
    assert_eq!(uniforms.dynamic_offset(1).unwrap(), 256);
    assert_eq!(
        *uniforms.memory().flushed.borrow(),
        [(0, 64), (256, 64), (512, 64)]
    );
    // Chain length differs from the slot count; image indices wrap independently.
    assert_eq!(sync.backend().submitted, [(0, 0), (1, 1), (2, 0)]);
}

#[derive(Default)]
struct CommandLog {
    events: Vec<String>,
    barriers: Vec<ImageBarrier>,
}

impl PassRecorder for CommandLog {
    fn barriers(&mut self, barriers: &[ImageBarrier]) -> RhiResult<()> {
        self.barriers.extend_from_slice(barriers);
        Ok(())
    }

    fn begin_pass(&mut self, pass: &CompiledPass) -> RhiResult<()> {
        self.events.push(format!("begin {}", pass.name()));
        Ok(())
    }

    fn end_pass(&mut self, pass: &CompiledPass) -> RhiResult<()> {
        self.events.push(format!("end {}", pass.name()));
        Ok(())
    }
}

#[test]
fn test_depth_producer_recorded_before_sampling_consumer() {
    let mut builder = GraphBuilder::new();
    let depth = builder.resource("D", ResourceKind::Depth);
    let color = builder.resource("color", ResourceKind::Color);
    // Declared consumer first: ordering must come from the edge.
    let consumer = builder.add_pass(
        PassDesc::new("consumer")
            .access(depth, Access::ShaderSampledRead)
            .access(color, Access::ColorAttachmentWrite),
    );
    let producer =
        builder.add_pass(PassDesc::new("producer").access(depth, Access::DepthAttachmentWrite));
    builder.add_dependency(producer, consumer);
    let graph = builder.compile().unwrap();

    let mut log = CommandLog::default();
    graph.record(&mut log, |_, _| Ok(())).unwrap();
    assert_eq!(
        log.events,
        ["begin producer", "end producer", "begin consumer", "end consumer"]
    );

    let [dependency] = graph.dependencies() else {
        panic!("expected exactly one dependency: {:?}", graph.dependencies());
    };
    assert_eq!(dependency.producer, producer);
    assert_eq!(dependency.consumer, consumer);
    assert_eq!(
        dependency.src_access,
        vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
    );
    assert_eq!(dependency.dst_access, vk::AccessFlags2::SHADER_SAMPLED_READ);

    let read = log
        .barriers
        .iter()
        .find(|b| b.resource == depth && b.producer == Some(producer))
        .unwrap();
    assert_eq!(read.new_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
}

#[test]
fn test_removing_the_edge_is_an_error_not_a_race() {
    let mut builder = GraphBuilder::new();
    let depth = builder.resource("shadow_map", ResourceKind::Depth);
    builder.add_pass(PassDesc::new("scene").access(depth, Access::ShaderSampledRead));
    builder.add_pass(PassDesc::new("shadow").access(depth, Access::DepthAttachmentWrite));
    let err = builder.compile().unwrap_err();
    assert!(matches!(err, RhiError::MissingPassDependency { .. }));
    let message = err.to_string();
    assert!(message.contains("shadow"), "{message}");
    assert!(message.contains("scene"), "{message}");
}
