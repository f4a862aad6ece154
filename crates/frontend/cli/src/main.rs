use anyhow::Result;
use clap::Parser;
use rec_core::logging::{LogConfig, LogLevel};
use rec_w65c816::{Cartridge, Recompiler, RunnerError};
use std::fs::File;
use std::io::Write;

#[derive(Parser)]
struct Args {
    /// Path to an iNES ROM image (16 KiB PRG mapped at $C000, mirrored at
    /// $8000)
    rom: String,

    /// Number of guest instructions to execute
    #[arg(long, default_value_t = 100)]
    instructions: u64,

    /// Override the reset vector (hex, e.g. C000)
    #[arg(long)]
    pc: Option<String>,

    /// Suppress the per-instruction trace (still writes --save)
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// Dump the final register file to this file as JSON
    #[arg(long, default_value = "state.json")]
    save: String,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "off")]
    log_level: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match LogLevel::from_str(&args.log_level) {
        Some(level) => LogConfig::global().set_global_level(level),
        None => anyhow::bail!("unknown log level: {}", args.log_level),
    }

    let mut sys = Recompiler::new();
    let cart = Cartridge::from_file(&args.rom)?;
    sys.load_cartridge(&cart);
    sys.reset();
    if let Some(pc) = args.pc.as_ref() {
        let pc = u16::from_str_radix(pc.trim_start_matches("0x"), 16)?;
        sys.set_pc(pc);
    }
    sys.trace = !args.quiet;

    let mut retired = 0u64;
    while retired < args.instructions {
        match sys.step_block() {
            Ok(summary) => {
                // Blocks may overshoot the budget by a few instructions;
                // clip the printed trace, not the execution.
                let remaining = (args.instructions - retired) as usize;
                for line in summary.trace.iter().take(remaining) {
                    println!("{line}");
                }
                retired += u64::from(summary.instructions);
            }
            // A stale block was rolled back; stepping again re-lifts it.
            Err(RunnerError::BlockInvalidated { .. }) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    let state = sys.save_state();
    let mut f = File::create(&args.save)?;
    write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
    Ok(())
}
