//! Every SPIR-V module the demos and the overlay load is produced by the
//! build script from a GLSL source in `assets/shaders`.

use std::path::{Path, PathBuf};

use vkdemo_rhi::shader::{ShaderStage, spirv_file_name};

#[allow(dead_code)]
#[path = "../build.rs"]
mod build_script;

/// `(name, stage)` of every module loaded at runtime.
const LOADED: &[(&str, ShaderStage)] = &[
    ("shadow", ShaderStage::Vertex),
    ("scene", ShaderStage::Vertex),
    ("scene", ShaderStage::Fragment),
    ("lamp", ShaderStage::Vertex),
    ("lamp", ShaderStage::Fragment),
    ("mesh", ShaderStage::Vertex),
    ("mesh", ShaderStage::Fragment),
    ("pbr", ShaderStage::Vertex),
    ("pbr", ShaderStage::Fragment),
    ("ui", ShaderStage::Vertex),
    ("ui", ShaderStage::Fragment),
];

fn shader_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
}

#[test]
fn test_every_loaded_module_has_a_source() {
    let dir = shader_dir();
    for &(name, stage) in LOADED {
        let source = dir.join(format!("{name}.{}", stage.extension()));
        assert!(source.is_file(), "missing {}", source.display());

        let output = build_script::spirv_path(&source).unwrap();
        assert_eq!(output, dir.join(spirv_file_name(name, stage)));
    }
}

#[test]
fn test_includes_are_not_compiled() {
    assert_eq!(build_script::spirv_path(Path::new("common.glsl")), None);
    assert_eq!(build_script::spirv_path(Path::new("README.md")), None);
    assert_eq!(
        build_script::spirv_path(Path::new("shaders/lamp.frag")),
        Some(PathBuf::from("shaders/lamp.frag.spv"))
    );
}

#[test]
fn test_stale_outputs_are_rebuilt() {
    let dir = std::env::temp_dir().join(format!("vkdemo-shaders-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let source = dir.join("stale_check.vert");
    std::fs::write(&source, "#version 450\nvoid main() {}\n").unwrap();
    let output = build_script::spirv_path(&source).unwrap();

    assert!(build_script::is_stale(&source, &output));
    std::fs::write(&output, [0u8; 4]).unwrap();
    assert!(!build_script::is_stale(&source, &output));
    std::fs::remove_dir_all(&dir).unwrap();
}
