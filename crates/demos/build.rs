// Compiles the GLSL sources in `assets/shaders` to SPIR-V next to them, as
// `<name>.<stage>.spv`, which is where the demos load them from.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 6] = ["vert", "frag", "comp", "geom", "tesc", "tese"];

/// `GLSLC`, then the Vulkan SDK, then whatever `glslc` is on `PATH`.
fn find_glslc() -> Option<PathBuf> {
    println!("cargo:rerun-if-env-changed=GLSLC");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    if let Ok(path) = env::var("GLSLC") {
        return Some(PathBuf::from(path));
    }
    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let exe = if cfg!(target_os = "windows") {
            "Bin/glslc.exe"
        } else {
            "bin/glslc"
        };
        let path = Path::new(&sdk).join(exe);
        if path.exists() {
            return Some(path);
        }
    }
    Command::new("glslc")
        .arg("--version")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|_| PathBuf::from("glslc"))
}

/// Output path for a stage source: `scene.vert` becomes `scene.vert.spv`.
pub fn spirv_path(source: &Path) -> Option<PathBuf> {
    let ext = source.extension()?.to_str()?;
    if !STAGES.contains(&ext) {
        return None;
    }
    let mut name = source.file_name()?.to_os_string();
    name.push(".spv");
    Some(source.with_file_name(name))
}

pub fn is_stale(source: &Path, output: &Path) -> bool {
    match (fs::metadata(source), fs::metadata(output)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src), Ok(dst)) => src > dst,
            _ => true,
        },
        _ => true,
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap_or_default());
    let shader_dir = manifest_dir.join("../../assets/shaders");
    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var_os("SKIP_SHADERS").is_some() {
        return;
    }
    let entries = match fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(e) => {
            println!(
                "cargo:warning=no shader directory at {}: {e}",
                shader_dir.display()
            );
            return;
        }
    };
    let Some(glslc) = find_glslc() else {
        println!(
            "cargo:warning=glslc not found; set GLSLC or VULKAN_SDK to compile assets/shaders"
        );
        return;
    };

    let mut sources: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    sources.sort();

    for source in sources {
        // `.glsl` files are includes, never standalone stages.
        let Some(output) = spirv_path(&source) else {
            continue;
        };
        println!("cargo:rerun-if-changed={}", source.display());
        if !is_stale(&source, &output) {
            continue;
        }
        let status = Command::new(&glslc)
            .arg("-I")
            .arg(&shader_dir)
            .arg(&source)
            .arg("-o")
            .arg(&output)
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => panic!(
                "glslc failed for {} ({status})",
                source.display()
            ),
            Err(e) => panic!("failed to run {}: {e}", glslc.display()),
        }
    }
}
