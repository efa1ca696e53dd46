//! Compiles `shaders/*.{vert,frag}` into `shaders/spirv/<name>.spv` with
//! `glslc`, which the passes load at runtime.
//!
//! A missing compiler only warns, so the crate still builds (and tests) on
//! machines without the Vulkan SDK. Set `SKIP_SHADERS` to skip compilation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 2] = ["vert", "frag"];

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let source_dir = manifest_dir.join("../../shaders");
    let output_dir = source_dir.join("spirv");

    println!("cargo:rerun-if-changed={}", source_dir.display());
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var_os("SKIP_SHADERS").is_some() {
        return;
    }

    let glslc = match env::var("VULKAN_SDK") {
        Ok(sdk) if cfg!(target_os = "windows") => PathBuf::from(sdk).join("Bin").join("glslc.exe"),
        Ok(sdk) => PathBuf::from(sdk).join("bin").join("glslc"),
        Err(_) => PathBuf::from("glslc"),
    };

    let entries = match fs::read_dir(&source_dir) {
        Ok(entries) => entries,
        Err(e) => {
            println!("cargo:warning=no shader directory at {}: {e}", source_dir.display());
            return;
        }
    };
    if let Err(e) = fs::create_dir_all(&output_dir) {
        println!("cargo:warning=cannot create {}: {e}", output_dir.display());
        return;
    }

    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STAGES.contains(&ext));
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_stage {
            continue;
        }

        let output = output_dir.join(format!("{name}.spv"));
        if is_up_to_date(&path, &output) {
            continue;
        }

        match Command::new(&glslc)
            .arg("--target-env=vulkan1.3")
            .arg("-I")
            .arg(&source_dir)
            .arg(&path)
            .arg("-o")
            .arg(&output)
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => {
                println!("cargo:warning=glslc failed on {name} ({status})");
            }
            Err(e) => {
                println!(
                    "cargo:warning=glslc not runnable ({e}), shaders not compiled; \
                     install the Vulkan SDK or set VULKAN_SDK"
                );
                return;
            }
        }
    }
}

/// Includes are shared, so any `.glsl` newer than the output also counts.
fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| fs::metadata(path).and_then(|meta| meta.modified()).ok();
    let Some(built) = modified(output) else {
        return false;
    };
    let newest_include = source
        .parent()
        .and_then(|dir| fs::read_dir(dir).ok())
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "glsl"))
        .filter_map(|path| modified(&path))
        .max();
    modified(source).is_some_and(|m| m <= built) && newest_include.is_none_or(|m| m <= built)
}
