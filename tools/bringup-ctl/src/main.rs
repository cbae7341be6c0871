//! bringup-ctl - platform bring-up from the command line
//!
//! Commands:
//! - `bringup-ctl detect` - Print the SKU of this system
//! - `bringup-ctl platforms` - List registered SKUs
//! - `bringup-ctl setup` - Load drivers and release resets
//! - `bringup-ctl clean` - Undo `setup`
//! - `bringup-ctl dump` - Show the platform and its driver state
//! - `bringup-ctl read32` / `write32` - Raw register access

use std::path::PathBuf;

use anyhow::{Context, Result};
use bringup_core::{
    klog, system_descriptor, BringupContext, DescriptorSource, ExecutionMode, Platform,
    SystemDescriptor,
};
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "bringup-ctl")]
#[command(version)]
#[command(about = "Switch platform bring-up", long_about = None)]
struct Cli {
    /// Boot parameters file
    #[arg(long, default_value = bringup_core::CMDLINE_PATH)]
    cmdline: PathBuf,

    /// Run without touching hardware
    #[arg(long)]
    simulate: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SKU read from the system descriptor
    Detect,

    /// List registered SKUs
    Platforms,

    /// Load platform drivers and take devices out of reset
    Setup {
        /// Use this SKU instead of detecting it
        #[arg(long)]
        sku: Option<String>,
    },

    /// Put devices in reset and unload platform drivers
    Clean {
        /// Use this SKU instead of detecting it
        #[arg(long)]
        sku: Option<String>,
    },

    /// Show the platform and its drivers
    Dump {
        /// Use this SKU instead of detecting it
        #[arg(long)]
        sku: Option<String>,
    },

    /// Read a 32-bit register
    Read32 {
        /// Register file
        path: PathBuf,

        /// Byte offset (hex with 0x, or decimal)
        offset: String,
    },

    /// Write a 32-bit register
    Write32 {
        /// Register file
        path: PathBuf,

        /// Byte offset (hex with 0x, or decimal)
        offset: String,

        /// Value (hex with 0x, or decimal)
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging starts once the mode is known
    let mode = resolve_mode(&cli)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose, mode)),
    )
    .init();

    log::debug!("execution mode: {:?}", mode);
    let ctx = BringupContext::new(mode);

    match cli.command {
        Commands::Detect => {
            let descriptor = system_descriptor().context("Failed to read system descriptor")?;
            println!("{}", descriptor.sku());
        }

        Commands::Platforms => {
            for sku in platforms::registry().skus() {
                println!("{}", sku);
            }
        }

        Commands::Setup { sku } => {
            let platform = resolve_platform(sku.as_deref())?;
            setup_platform(platform.as_ref(), &ctx)?;
        }

        Commands::Clean { sku } => {
            let platform = resolve_platform(sku.as_deref())?;
            println!("{} Cleaning {}", "→".yellow(), platform.name().bold());
            platform.clean(&ctx);
        }

        Commands::Dump { sku } => {
            let platform = resolve_platform(sku.as_deref())?;
            for line in dump_platform(platform.as_ref(), &SystemDescriptor, &ctx) {
                println!("{}", line);
            }
        }

        Commands::Read32 { path, offset } => {
            let offset = parse_hex_or_dec(&offset)?;
            let value = ctx
                .registers()
                .read32(&path, offset)
                .with_context(|| format!("Failed to read {}+{:#x}", path.display(), offset))?;
            println!("{:#010x}", value);
        }

        Commands::Write32 { path, offset, value } => {
            let offset = parse_hex_or_dec(&offset)?;
            let value = u32::try_from(parse_hex_or_dec(&value)?)
                .context("Value does not fit in 32 bits")?;
            ctx.registers()
                .write32(&path, offset, value)
                .with_context(|| format!("Failed to write {}+{:#x}", path.display(), offset))?;
        }
    }

    Ok(())
}

fn resolve_mode(cli: &Cli) -> Result<ExecutionMode> {
    if cli.simulate {
        let mode = ExecutionMode::simulated();
        mode.install().context("Failed to select simulation mode")?;
        return Ok(mode);
    }

    ExecutionMode::init_from(&cli.cmdline)
        .with_context(|| format!("Failed to read boot parameters from {}", cli.cmdline.display()))
}

fn log_filter(verbose: bool, mode: ExecutionMode) -> &'static str {
    if verbose || mode.is_debug() {
        "debug"
    } else {
        "info"
    }
}

fn resolve_platform(sku: Option<&str>) -> Result<Box<dyn Platform>> {
    platforms::registry()
        .get(sku, &SystemDescriptor)
        .context("Failed to identify platform")
}

fn setup_platform(platform: &dyn Platform, ctx: &BringupContext) -> Result<()> {
    println!("{} Setting up {}", "→".green(), platform.name().bold());
    klog(&format!("setting up platform {}", platform.name()));

    platform
        .setup(ctx)
        .with_context(|| format!("Failed to set up {}", platform.name()))?;

    klog(&format!("platform {} ready", platform.name()));
    println!("{} {} ready", "✓".green(), platform.name().bold());
    Ok(())
}

fn dump_platform(
    platform: &dyn Platform,
    source: &dyn DescriptorSource,
    ctx: &BringupContext,
) -> Vec<String> {
    let mut lines = vec![platform.name().bold().to_string()];

    match source.descriptor() {
        Ok(descriptor) => {
            for (key, value) in descriptor.fields() {
                lines.push(format!("  {:<16} {}", key, value));
            }
        }
        Err(e) => {
            log::warn!("cannot read system descriptor: {}", e);
            lines.push(format!("  {} {}", "descriptor unavailable:".yellow(), e));
        }
    }

    lines.push("Drivers:".bold().to_string());
    for driver in platform.drivers() {
        let state = match driver.loaded(ctx.modules()) {
            Ok(true) => "loaded".green(),
            Ok(false) => "not loaded".red(),
            Err(e) => {
                log::warn!("cannot read state of {}: {}", driver.module(), e);
                "unknown".yellow()
            }
        };
        lines.push(format!("  {:<24} {}", driver.module(), state));
    }

    match platform.gpio_status(ctx) {
        Ok(gpios) if gpios.is_empty() => {}
        Ok(gpios) => {
            lines.push("GPIOs:".bold().to_string());
            for (name, asserted) in gpios {
                let state = if asserted { "1".green() } else { "0".red() };
                lines.push(format!("  {:<24} {}", name, state));
            }
        }
        Err(e) => log::warn!("cannot read GPIOs: {}", e),
    }

    lines
}

fn parse_hex_or_dec(s: &str) -> Result<usize> {
    if let Some(hex) = s.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).context("Invalid hex number")
    } else {
        s.parse::<usize>().context("Invalid decimal number")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreadable;

    impl DescriptorSource for Unreadable {
        fn descriptor(&self) -> bringup_core::Result<&bringup_core::PlatformDescriptor> {
            Err(bringup_core::BringupError::HardwareNotFound)
        }
    }

    struct Simulated(bringup_core::PlatformDescriptor);

    impl DescriptorSource for Simulated {
        fn descriptor(&self) -> bringup_core::Result<&bringup_core::PlatformDescriptor> {
            Ok(&self.0)
        }
    }

    fn plain(lines: Vec<String>) -> String {
        lines.join("\n")
    }

    #[test]
    fn test_dump_reports_unreadable_descriptor() {
        colored::control::set_override(false);
        let ctx = BringupContext::new(ExecutionMode::simulated());
        let platform = platforms::Simulation::new();

        let healthy = plain(dump_platform(
            &platform,
            &Simulated(bringup_core::PlatformDescriptor::simulated()),
            &ctx,
        ));
        let broken = plain(dump_platform(&platform, &Unreadable, &ctx));

        assert!(healthy.contains("SKU"));
        assert!(!healthy.contains("descriptor unavailable"));
        assert!(broken.contains("descriptor unavailable"));
        assert!(broken.contains("Could not find valid system descriptor"));
        assert_ne!(healthy, broken);
    }

    #[test]
    fn test_dump_reports_unknown_driver_state() {
        colored::control::set_override(false);
        let dir = tempfile::tempdir().unwrap();
        let ctx = BringupContext::new(ExecutionMode::simulated()).with_modules(Box::new(
            bringup_core::Modprobe::new().with_proc_modules(dir.path().join("missing")),
        ));

        let out = plain(dump_platform(
            &platforms::Simulation::new(),
            &Simulated(bringup_core::PlatformDescriptor::simulated()),
            &ctx,
        ));
        assert!(out.contains("unknown"));
        assert!(!out.contains("not loaded"));
    }

    #[test]
    fn test_log_filter_follows_mode() {
        use bringup_core::Environment;

        assert_eq!(log_filter(false, ExecutionMode::simulated()), "info");
        assert_eq!(log_filter(true, ExecutionMode::simulated()), "debug");
        assert_eq!(
            log_filter(false, ExecutionMode::new(Environment::Real, true)),
            "debug"
        );
    }

    #[test]
    fn test_parse_hex_or_dec() {
        assert_eq!(parse_hex_or_dec("0x4000").unwrap(), 0x4000);
        assert_eq!(parse_hex_or_dec("16").unwrap(), 16);
        assert!(parse_hex_or_dec("0xzz").is_err());
        assert!(parse_hex_or_dec("ten").is_err());
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["bringup-ctl", "--simulate", "setup", "--sku", "DCS-7170-64"])
            .unwrap();
        assert!(cli.simulate);
        assert!(matches!(cli.command, Commands::Setup { sku: Some(ref s) } if s == "DCS-7170-64"));

        let cli = Cli::try_parse_from(["bringup-ctl", "write32", "/dev/null", "0x10", "0xff"]).unwrap();
        assert_eq!(cli.cmdline, PathBuf::from("/proc/cmdline"));
        assert!(matches!(cli.command, Commands::Write32 { .. }));
    }
}
