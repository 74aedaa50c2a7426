//! CPU-side pipeline tests: preprocessing, hashing, caching, reflection.
//! None of these need a GPU device.

use std::fs;
use std::path::{Path, PathBuf};

use ezgpu::{BindingKind, CompileMode, GpuError, KernelBinary};

const BIAS_KERNEL: &str = r#"
#include "common.wgsl"

struct Arguments {
    bias: f32,
}

@group(0) @binding(0) var<storage, read> src: array<f32>;
@group(0) @binding(1) var<storage, read_write> dst: array<f32>;
@group(0) @binding(2) var<uniform> arguments: Arguments;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= arrayLength(&src)) {
        return;
    }
    dst[i] = apply_bias(src[i], arguments.bias);
}
"#;

const COMMON: &str = r#"
fn apply_bias(value: f32, bias: f32) -> f32 {
    return value + bias;
}
"#;

fn write_kernel(dir: &Path) -> PathBuf {
    fs::write(dir.join("common.wgsl"), COMMON).unwrap();
    let path = dir.join("bias_add.wgsl");
    fs::write(&path, BIAS_KERNEL).unwrap();
    path
}

fn cached_artifacts(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".il"))
        .collect();
    names.sort();
    names
}

#[test]
fn compile_publishes_artifact_beside_source() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let binary = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    assert!(!binary.from_cache());

    let artifacts = cached_artifacts(dir.path());
    assert_eq!(artifacts.len(), 1);
    assert_eq!(
        artifacts[0],
        format!("bias_add_{:08x}.il", binary.hash())
    );
}

#[test]
fn second_compile_hits_the_cache_with_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let cold = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    let warm = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();

    assert!(!cold.from_cache());
    assert!(warm.from_cache());
    assert_eq!(cold.spirv(), warm.spirv());
}

#[test]
fn cached_reflection_matches_cold_reflection() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let cold = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    let warm = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    assert!(warm.from_cache());

    assert_eq!(cold.layout().slots(), warm.layout().slots());
    assert_eq!(cold.entry_point(), warm.entry_point());
    assert_eq!(cold.workgroup_size(), warm.workgroup_size());
}

#[test]
fn reflected_layout_names_kinds_and_slots() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let binary = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    let layout = binary.layout();

    assert_eq!(layout.len(), 3);
    let src = layout.slot_of("src").unwrap();
    assert_eq!((src.slot, src.kind), (0, BindingKind::StorageRead));
    let dst = layout.slot_of("dst").unwrap();
    assert_eq!((dst.slot, dst.kind), (1, BindingKind::StorageReadWrite));
    let args = layout.slot_of("arguments").unwrap();
    assert_eq!((args.slot, args.kind), (2, BindingKind::Constant));

    assert_eq!(binary.entry_point(), "main");
    assert_eq!(binary.workgroup_size(), [64, 1, 1]);
}

#[test]
fn debug_and_release_artifacts_coexist() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let release = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    let debug = KernelBinary::compile(&kernel, &[], CompileMode::Debug).unwrap();
    assert!(!debug.from_cache());
    assert_eq!(release.hash(), debug.hash());

    let artifacts = cached_artifacts(dir.path());
    assert_eq!(
        artifacts,
        vec![
            format!("bias_add_{:08x}.il", release.hash()),
            format!("bias_add_{:08x}.il_d", debug.hash()),
        ]
    );

    // Each flavor now loads from its own artifact.
    assert!(KernelBinary::compile(&kernel, &[], CompileMode::Release)
        .unwrap()
        .from_cache());
    assert!(KernelBinary::compile(&kernel, &[], CompileMode::Debug)
        .unwrap()
        .from_cache());
}

#[test]
fn editing_an_included_file_changes_the_cache_key() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let before = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();

    fs::write(
        dir.path().join("common.wgsl"),
        "fn apply_bias(value: f32, bias: f32) -> f32 {\n    return value + bias * 2.0;\n}\n",
    )
    .unwrap();

    let after = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    assert_ne!(before.hash(), after.hash());
    assert!(!after.from_cache());
    assert_eq!(cached_artifacts(dir.path()).len(), 2);
}

#[test]
fn corrupt_artifact_is_recompiled_over() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let cold = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    let artifact = dir
        .path()
        .join(format!("bias_add_{:08x}.il", cold.hash()));
    fs::write(&artifact, b"not spirv").unwrap();

    let recompiled = KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap();
    assert!(!recompiled.from_cache());
    assert_eq!(recompiled.spirv(), cold.spirv());
}

#[test]
fn missing_include_fails_before_hashing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.wgsl");
    fs::write(&path, "#include \"nope.wgsl\"\n").unwrap();

    let err = KernelBinary::compile(&path, &[], CompileMode::Release).unwrap_err();
    assert!(matches!(err, GpuError::IncludeNotFound { .. }));
    assert!(cached_artifacts(dir.path()).is_empty());
}

#[test]
fn invalid_source_is_a_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.wgsl");
    fs::write(&path, "@compute fn main( {\n").unwrap();

    let err = KernelBinary::compile(&path, &[], CompileMode::Release).unwrap_err();
    assert!(matches!(err, GpuError::Compile { .. }));
    assert!(cached_artifacts(dir.path()).is_empty());
}

#[test]
fn include_dirs_resolve_shared_headers() {
    let lib_dir = tempfile::tempdir().unwrap();
    let src_dir = tempfile::tempdir().unwrap();
    fs::write(lib_dir.path().join("common.wgsl"), COMMON).unwrap();
    let path = src_dir.path().join("bias_add.wgsl");
    fs::write(&path, BIAS_KERNEL).unwrap();

    let binary = KernelBinary::compile(
        &path,
        &[lib_dir.path().to_path_buf()],
        CompileMode::Release,
    )
    .unwrap();
    assert_eq!(binary.layout().len(), 3);
}

#[test]
fn concurrent_compiles_agree() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = write_kernel(dir.path());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let kernel = kernel.clone();
            std::thread::spawn(move || {
                KernelBinary::compile(&kernel, &[], CompileMode::Release).unwrap()
            })
        })
        .collect();
    let binaries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for binary in &binaries {
        assert_eq!(binary.hash(), binaries[0].hash());
        assert_eq!(binary.spirv(), binaries[0].spirv());
    }

    // No temp files survive the races.
    assert_eq!(cached_artifacts(dir.path()).len(), 1);
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 3); // kernel, header, artifact
}
