//! `hipk info`: runtime and device listing.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use hipk_harness::{Backend, HarnessConfig, PrecompiledKernel, open_runtime};
use hipk_runtime::{enumerate_devices, hip_runtime_available};

#[derive(Args, Debug, Default)]
pub struct InfoCommand {
    /// Runtime backend to query (hip, emulated, auto)
    #[arg(short, long, value_name = "BACKEND")]
    pub backend: Option<Backend>,
}

impl InfoCommand {
    pub fn execute(&self, config: &HarnessConfig) -> Result<()> {
        let backend = self.backend.unwrap_or(config.launch.backend);

        println!("{}", style("hipk system information").bold().cyan());
        println!();
        println!("{}", style("Version:").bold());
        println!("  hipk: {}", env!("CARGO_PKG_VERSION"));
        println!();

        println!("{}", style("Runtime:").bold());
        match hip_runtime_available() {
            true => println!("  HIP library: {}", style("✓ Available").green()),
            false => println!("  HIP library: {}", style("✗ Not found").red()),
        }
        let runtime = open_runtime(backend, config.validation.convention)
            .with_context(|| format!("opening {backend} backend"))?;
        println!("  Backend:     {} (requested {backend})", runtime.name());
        println!();

        println!("{}", style("Devices:").bold());
        let devices = enumerate_devices(runtime.as_ref()).context("enumerating devices")?;
        if devices.is_empty() {
            println!("  {}", style("none").yellow());
        }
        for dev in &devices {
            println!("  [{}] {}", dev.index, dev.name);
        }
        println!();

        println!("{}", style("Kernels:").bold());
        for &kernel in PrecompiledKernel::ALL {
            let sig = kernel.signature();
            println!(
                "  {} v{} ({} args, {} B) from {}",
                kernel.entry_point(),
                sig.version,
                sig.params.len(),
                sig.buffer_size(),
                kernel.default_code_object()
            );
        }
        Ok(())
    }
}
