use tessera_fb::{BufferKind, Channels, ColorFormat, Extent, FrameBuffer, FrameBufferError};

fn frame_buffer() -> FrameBuffer<'static> {
    FrameBuffer::new(
        Extent::new(32, 16),
        ColorFormat::Rgba8,
        Channels::DEPTH | Channels::ACCUM,
    )
    .unwrap()
}

#[test]
fn map_then_unmap_restores_count() {
    let fb = frame_buffer();
    let color = fb.map_buffer(BufferKind::Color).unwrap();
    assert_eq!(color.kind(), BufferKind::Color);
    assert_eq!(color.view().len(), 32 * 16);
    assert_eq!(fb.mapped_count(), 1);

    fb.unmap(color).unwrap();
    assert_eq!(fb.mapped_count(), 0);
}

#[test]
fn dropping_a_mapping_releases_it() {
    let fb = frame_buffer();
    {
        let _color = fb.map_buffer(BufferKind::Color).unwrap();
        let _depth = fb.map_buffer(BufferKind::Depth).unwrap();
        assert_eq!(fb.mapped_count(), 2);
    }
    assert_eq!(fb.mapped_count(), 0);
}

#[test]
fn absent_buffers_are_not_mapped() {
    let fb = frame_buffer();
    assert!(fb.map_buffer(BufferKind::Normal).is_none());
    assert!(fb.map_buffer(BufferKind::Albedo).is_none());
    assert_eq!(fb.mapped_count(), 0);
}

#[test]
fn unmap_rejects_mapping_from_another_frame_buffer() {
    let fb = frame_buffer();
    let other = frame_buffer();

    let foreign = other.map_buffer(BufferKind::Depth).unwrap();
    let own = fb.map_buffer(BufferKind::Color).unwrap();
    assert_eq!(other.mapped_count(), 1);

    assert_eq!(fb.unmap(foreign), Err(FrameBufferError::ForeignMapping));
    // The rejected mapping still released its own frame buffer.
    assert_eq!(other.mapped_count(), 0);
    assert_eq!(fb.mapped_count(), 1);

    fb.unmap(own).unwrap();
    assert_eq!(fb.mapped_count(), 0);
}

#[test]
fn mappings_can_be_shared_across_threads() {
    let fb = frame_buffer();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    let mapping = fb.map_buffer(BufferKind::Color).unwrap();
                    assert_eq!(mapping.to_rgba8().len(), 32 * 16 * 4);
                    fb.unmap(mapping).unwrap();
                }
            });
        }
    });
    assert_eq!(fb.mapped_count(), 0);
}
