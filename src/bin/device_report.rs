//! Prints every visible adapter and the compute capabilities of the one the
//! default policy would pick.

use ezgpu::{DeviceContext, GpuError};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let adapters = ezgpu::enumerate_adapters();
    if adapters.is_empty() {
        println!("no GPU adapters found");
        return Ok(());
    }

    println!("adapters:");
    for adapter in &adapters {
        let info = adapter.get_info();
        println!(
            "  {} [{:?}, {:?}, driver: {}]",
            info.name, info.backend, info.device_type, info.driver
        );
    }

    let adapter = ezgpu::pick_adapter(adapters).ok_or(GpuError::NoAdapter)?;
    let ctx = DeviceContext::new(&adapter)?;
    let caps = ctx.capabilities();

    println!();
    println!("selected: {}", caps.name);
    println!("  backend:                    {:?}", caps.backend);
    println!("  device type:                {:?}", caps.device_type);
    println!("  max workgroup size:         {:?}", caps.max_workgroup_size);
    println!(
        "  max invocations/workgroup:  {}",
        caps.max_invocations_per_workgroup
    );
    println!(
        "  max storage binding size:   {} bytes",
        caps.max_storage_buffer_binding_size
    );
    println!("  max bindings/group:         {}", caps.max_bindings_per_group);

    Ok(())
}
