// rio2rpy - RIO/WillPlus bytecode to Ren'Py transpiler
//
// Translates decrypted WillPlus scenario scripts (.WSC) into Ren'Py
// script files, one `.rpy` per input.
//
// Usage:
//   rio2rpy --settings title.json -o game/scripts Rio/*.WSC
//   rio2rpy --disasm -o listings Rio/01_A.WSC
//   rio2rpy --settings title.json --export-characters game/chara.rpy --export-flags game/flags.rpy

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rio2rpy::{export, Settings, Version};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "rio2rpy")]
#[command(about = "RIO/WillPlus bytecode to Ren'Py transpiler")]
#[command(version)]
struct Args {
    /// Input RIO scripts
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Title settings (JSON)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Opcode table version (default, ymk, io); overrides the settings file
    #[arg(long)]
    opcode_version: Option<Version>,

    /// Write disassembly listings (.txt) instead of Ren'Py scripts
    #[arg(long)]
    disasm: bool,

    /// Write the character definitions to this file
    #[arg(long)]
    export_characters: Option<PathBuf>,

    /// Write the flag name table to this file
    #[arg(long)]
    export_flags: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Only report translation errors through the exit status
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(args: &Args) {
    use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

    let level = if args.quiet {
        LevelFilter::Off
    } else if args.verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Warn
    };
    let config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();
    TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto).ok();
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings {}", path.display()))?;
            Settings::from_json(&text)
                .with_context(|| format!("Failed to load settings {}", path.display()))?
        }
        None => Settings::default(),
    };
    if let Some(version) = args.opcode_version {
        settings.opcode_version = version;
    }
    Ok(settings)
}

fn script_name(input: &Path) -> Result<String> {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} is not a script file", input.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let settings = load_settings(&args)?;
    log::debug!("opcode version: {:?}", settings.opcode_version);

    if let Some(path) = &args.export_characters {
        fs::write(path, export::characters(&settings))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = &args.export_flags {
        fs::write(path, export::flag_names(&settings))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if args.inputs.is_empty() {
        if args.export_characters.is_none() && args.export_flags.is_none() {
            bail!("No input specified");
        }
        return Ok(());
    }

    fs::create_dir_all(&args.out_dir).context("Failed to create output directory")?;

    let mut incomplete = Vec::new();
    for input in &args.inputs {
        let script = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
        let name = script_name(input)?;

        if args.disasm {
            let output = args.out_dir.join(format!("{}.txt", name));
            fs::write(&output, rio2rpy::disassemble(&script, &settings))
                .with_context(|| format!("Failed to write {}", output.display()))?;
            continue;
        }

        let translation = rio2rpy::transpile(&name, &script, &settings);
        let output = args.out_dir.join(format!("{}.rpy", name));
        fs::write(&output, &translation.text)
            .with_context(|| format!("Failed to write {}", output.display()))?;

        match translation.error {
            Some(err) => {
                log::error!("{}: {}", input.display(), err);
                incomplete.push(name);
            }
            None => log::info!("Wrote: {}", output.display()),
        }
    }

    if !incomplete.is_empty() {
        bail!(
            "{} script(s) translated incompletely: {}",
            incomplete.len(),
            incomplete.join(", ")
        );
    }
    Ok(())
}
