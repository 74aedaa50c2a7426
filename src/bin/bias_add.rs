//! End-to-end sample: upload a million floats, add a bias on the GPU,
//! read the result back and verify it.

use std::path::Path;

use anyhow::Context;
use ezgpu::{
    dispatch_size, CompileMode, ConstantBuffer, DeviceContext, GpuError, Kernel, StorageBuffer,
};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Arguments {
    bias: f32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let adapters = ezgpu::enumerate_adapters();
    println!("{} adapter(s) found:", adapters.len());
    for adapter in &adapters {
        let info = adapter.get_info();
        println!(
            "  {} [{:?}, {:?}]{}",
            info.name,
            info.backend,
            info.device_type,
            if ezgpu::has_dedicated_memory(&info) {
                " (dedicated memory)"
            } else {
                ""
            }
        );
    }

    // Prefer a discrete GPU, fall back to whatever is available.
    let (dedicated, other): (Vec<_>, Vec<_>) = adapters
        .into_iter()
        .partition(|a| ezgpu::has_dedicated_memory(&a.get_info()));
    let adapter = ezgpu::pick_adapter(dedicated)
        .or_else(|| ezgpu::pick_adapter(other))
        .ok_or(GpuError::NoAdapter)?;

    let ctx = DeviceContext::new(&adapter)?;
    println!("using {}", ctx.name());

    let kernel_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders/bias_add.wgsl");
    let kernel = Kernel::load(&ctx, &kernel_path, &[], CompileMode::Release)
        .context("failed to load bias_add kernel")?;

    let n: u64 = 1 << 20;
    let stride = std::mem::size_of::<f32>() as u64;
    let input: Vec<f32> = (0..n).map(|i| i as f32 / 10.0).collect();
    let bias = 10.0f32;

    let src = StorageBuffer::new(&ctx, n * stride, stride, Some("src"));
    let dst = StorageBuffer::new(&ctx, n * stride, stride, Some("dst"));
    let arguments = ConstantBuffer::<Arguments>::new(&ctx, Some("arguments"));
    arguments.write(&ctx, &Arguments { bias });

    src.upload(&ctx, bytemuck::cast_slice(&input))?.wait();

    let mut args = kernel.create_argument_table();
    args.bind_storage("src", &src)?;
    args.bind_storage("dst", &dst)?;
    args.bind_uniform("arguments", &arguments)?;

    kernel.dispatch(&ctx, &args, [dispatch_size(n, 64), 1, 1])?;

    let mapped = dst.begin_download(&ctx).wait()?;
    let view = mapped.view::<f32>();
    let mut mismatches = 0usize;
    for i in 0..view.count() {
        let expected = input[i] + bias;
        if view[i] != expected {
            if mismatches < 8 {
                eprintln!("  [{i}] got {} expected {expected}", view[i]);
            }
            mismatches += 1;
        }
    }

    if mismatches == 0 {
        println!("ok: {} elements verified", view.count());
        Ok(())
    } else {
        anyhow::bail!("{mismatches} mismatched elements");
    }
}
