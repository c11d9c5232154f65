//! Basic functionality tests for multi-DM image segments

use mdm_shm::{ImageReader, ImageShape, ImageWriter, SegmentDiscovery, ShmError, ShmResult};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_basic_publish_read() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let frame: Vec<f64> = (0..144).map(|i| i as f64 / 144.0).collect();

    let writer = ImageWriter::create(dir.path(), "dm1", ImageShape::square(12))?;
    writer.publish(&frame)?;

    let mut reader = ImageReader::attach(dir.path(), "dm1")?;
    assert_eq!(reader.read()?, frame.as_slice());
    Ok(())
}

#[test]
fn test_counter_increases_once_per_publish() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let writer = ImageWriter::create(dir.path(), "dm1disp00", ImageShape::square(12))?;
    let reader = ImageReader::attach(dir.path(), "dm1disp00")?;

    let before = reader.counter();
    for _ in 0..7 {
        writer.zero()?;
    }
    assert_eq!(reader.counter(), before + 7);
    Ok(())
}

#[test]
fn test_external_producer_and_reader() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let _owner = ImageWriter::create(dir.path(), "dm3disp02", ImageShape::square(12))?;

    let producer = ImageWriter::attach(dir.path(), "dm3disp02")?;
    let mut frame = vec![0.0; 144];
    frame[13] = 0.9;
    producer.publish(&frame)?;

    let mut reader = ImageReader::attach(dir.path(), "dm3disp02")?;
    assert_eq!(reader.read()?[13], 0.9);
    Ok(())
}

#[test]
fn test_concurrent_readers_never_see_torn_frames() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let writer = Arc::new(ImageWriter::create(
        dir.path(),
        "dm1",
        ImageShape::square(12),
    )?);

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let path = dir.path().to_path_buf();
            std::thread::spawn(move || -> ShmResult<()> {
                let mut reader = ImageReader::attach(&path, "dm1")?;
                for _ in 0..2000 {
                    match reader.read() {
                        Ok(frame) => {
                            let first = frame[0];
                            assert!(frame.iter().all(|&v| v == first));
                        }
                        Err(ShmError::VersionConflict) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            })
        })
        .collect();

    for n in 0..2000 {
        writer.publish(&vec![n as f64; 144])?;
    }

    for handle in handles {
        handle.join().unwrap()?;
    }
    Ok(())
}

#[test]
fn test_wait_for_update_across_threads() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let writer = ImageWriter::create(dir.path(), "dm2", ImageShape::square(12))?;
    let reader = ImageReader::attach(dir.path(), "dm2")?;

    assert!(!reader.wait_for_update(Duration::from_millis(10)));

    let publisher = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        writer.zero().map(|_| writer)
    });

    assert!(reader.wait_for_update(Duration::from_secs(5)));
    let _writer = publisher.join().unwrap()?;
    Ok(())
}

#[test]
fn test_invalid_shape() {
    let dir = tempfile::tempdir().unwrap();
    let result = ImageWriter::create(
        dir.path(),
        "bad",
        ImageShape {
            width: 0,
            height: 0,
        },
    );
    assert!(matches!(result, Err(ShmError::InvalidShape { .. })));
}

#[test]
fn test_discovery_tracks_create_and_destroy() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let discovery = SegmentDiscovery::new(dir.path());

    let writer = ImageWriter::create(dir.path(), "dm4", ImageShape::square(12))?;
    assert!(discovery.exists("dm4"));
    assert_eq!(discovery.list_segments()?.len(), 1);

    writer.destroy()?;
    assert!(!discovery.exists("dm4"));
    assert!(discovery.list_segments()?.is_empty());
    Ok(())
}
