//! Integration tests for texture decoding and the demo scene.

use umbra_resources::{ResourceError, TextureData, demo_scene};

#[test]
fn test_load_png_texture() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("checker.png");

    let mut img = image::RgbaImage::new(4, 2);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let on = (x + y) % 2 == 0;
        *pixel = image::Rgba(if on { [255, 255, 255, 255] } else { [0, 0, 0, 128] });
    }
    img.save(&path).expect("Failed to write PNG");

    let texture = TextureData::load(&path).expect("Failed to decode PNG");

    assert_eq!((texture.width, texture.height), (4, 2));
    assert_eq!(texture.pixels.len(), texture.texel_count() * 4);
    assert_eq!(&texture.pixels[0..4], &[255, 255, 255, 255]);
    assert_eq!(&texture.pixels[4..8], &[0, 0, 0, 128]);
}

#[test]
fn test_load_rejects_garbage() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"definitely not a png").expect("Failed to write file");

    assert!(matches!(
        TextureData::load(&path),
        Err(ResourceError::Image(_))
    ));
}

#[test]
fn test_demo_scene_bounds() {
    let models = demo_scene();
    let (min, max) = models
        .iter()
        .filter_map(|m| m.bounds())
        .reduce(|(amin, amax), (bmin, bmax)| (amin.min(bmin), amax.max(bmax)))
        .expect("demo scene should not be empty");

    // Ground plane spans 40 units; pillars stand on it.
    assert_eq!(min.x, -20.0);
    assert_eq!(max.z, 20.0);
    assert_eq!(min.y, 0.0);
    assert!(max.y > 3.0);
}
