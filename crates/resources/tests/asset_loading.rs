//! Loading assets from disk.

use std::fs;
use std::path::PathBuf;

use vkdemo_resources::{MeshData, ResourceError, TextureData};
use vkdemo_rhi::RhiError;

fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vkdemo_resources_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

const QUAD_OBJ: &str = "\
v -1.0 0.0 -1.0
v 1.0 0.0 -1.0
v 1.0 0.0 1.0
v -1.0 0.0 1.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 1.0 0.0
f 1/1/1 4/4/1 3/3/1 2/2/1
";

#[test]
fn test_obj_quad_is_triangulated() {
    let path = scratch_file("quad.obj", QUAD_OBJ.as_bytes());
    let mesh = MeshData::load_obj(&path).unwrap();

    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.index_count(), 6);
    assert!(mesh.vertices.iter().all(|v| v.normal.y == 1.0));
    // V is flipped: vt 0 0 becomes (0, 1).
    let first = mesh
        .vertices
        .iter()
        .find(|v| v.position.x == -1.0 && v.position.z == -1.0)
        .unwrap();
    assert_eq!(first.tex_coord.to_array(), [0.0, 1.0]);
}

#[test]
fn test_obj_without_faces_is_rejected() {
    let path = scratch_file("points.obj", b"v 0 0 0\nv 1 0 0\n");
    let err = MeshData::load_obj(&path).unwrap_err();
    assert!(matches!(err, ResourceError::EmptyMesh(_)));
}

#[test]
fn test_missing_obj_maps_to_asset_load() {
    let path = PathBuf::from("no/such/model.obj");
    let err: RhiError = MeshData::load_obj(&path).unwrap_err().into();
    match err {
        RhiError::AssetLoad { path: reported, reason } => {
            assert_eq!(reported, path);
            assert!(reason.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_png_round_trip_through_decoder() {
    let source = TextureData::checkerboard(4, 2, [255, 0, 0, 255], [0, 0, 255, 255]);
    let img = image::RgbaImage::from_raw(source.width, source.height, source.pixels.clone())
        .unwrap();
    let dir = std::env::temp_dir().join(format!("vkdemo_resources_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("checker.png");
    img.save(&path).unwrap();

    let loaded = TextureData::load(&path).unwrap();
    assert_eq!(loaded, source);
}

#[test]
fn test_corrupt_image_is_a_decode_error() {
    let path = scratch_file("broken.png", b"definitely not a png");
    let err = TextureData::load(&path).unwrap_err();
    assert!(matches!(err, ResourceError::Image { .. }));
}
