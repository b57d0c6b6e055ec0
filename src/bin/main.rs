//! X-Plane OBJ8 exporter CLI
//!
//! Compile JSON scene documents into OBJ8 scenery objects.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use xplane_obj8::{
    resolve_dataref, CompilerConfig, DatarefRegistry, Obj8Compiler, Platform, Properties,
    SceneDocument,
};

#[derive(Parser)]
#[command(name = "xplane-obj8")]
#[command(author, version, about = "Compile annotated 3D scenes into X-Plane OBJ8 objects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene document to an OBJ8 file
    Export {
        /// Input JSON scene document
        #[arg(short, long)]
        input: PathBuf,

        /// Output .obj path
        #[arg(short, long)]
        output: PathBuf,

        /// Produce an instance-safe object
        #[arg(long)]
        instanced: bool,

        /// Mark the object as a lit cockpit
        #[arg(long)]
        cockpit: bool,

        /// Header platform byte
        #[arg(short, long, value_enum)]
        platform: Option<PlatformArg>,

        /// DataRefs.txt to resolve bone names against
        #[arg(short, long)]
        datarefs: Option<PathBuf>,

        /// Directory holding the object's textures
        #[arg(short, long)]
        texture_dir: Option<PathBuf>,

        /// Log each pipeline stage
        #[arg(short, long)]
        verbose: bool,
    },

    /// Resolve a dataref leaf name against a DataRefs.txt
    Datarefs {
        /// DataRefs.txt path
        #[arg(short, long)]
        datarefs: PathBuf,

        /// Leaf name, optionally indexed (e.g. "throttle_ratio[1]")
        #[arg(short, long)]
        leaf: String,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PlatformArg {
    /// Apple (`A`)
    A,
    /// IBM (`I`)
    I,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::A => Platform::Apple,
            PlatformArg::I => Platform::Ibm,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            input,
            output,
            instanced,
            cockpit,
            platform,
            datarefs,
            texture_dir,
            verbose,
        } => {
            let level = if verbose { "debug" } else { "error" };
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
            export(
                &input,
                &output,
                instanced,
                cockpit,
                platform.map(Platform::from),
                datarefs.as_deref(),
                texture_dir,
            )?;
        }
        Commands::Datarefs { datarefs, leaf } => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
            let registry = DatarefRegistry::from_path(&datarefs)?;
            println!("Loaded {} datarefs from {:?}", registry.len(), datarefs);
            match resolve_dataref(&leaf, &Properties::new(), &registry) {
                Ok(path) => println!("{} -> {}", leaf, path),
                Err(e) => println!("{}: {}", leaf, e),
            }
        }
    }

    Ok(())
}

fn export(
    input: &Path,
    output: &Path,
    instanced: bool,
    cockpit: bool,
    platform: Option<Platform>,
    datarefs: Option<&Path>,
    texture_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading scene from {:?}...", input);
    let mut scene = SceneDocument::from_path(input)?;

    let mut config = scene.config.clone().unwrap_or_default();
    config.instanced |= instanced;
    config.cockpit |= cockpit;
    if let Some(platform) = platform {
        config.platform = platform;
    }
    if let Some(dir) = texture_dir {
        config.texture_dir = Some(dir);
    } else if config.texture_dir.is_none() {
        config.texture_dir = input.parent().map(Path::to_path_buf);
    }
    print_config(&config);

    let registry = match datarefs {
        Some(path) => {
            let registry = DatarefRegistry::from_path(path)?;
            println!("  Loaded {} datarefs", registry.len());
            registry
        }
        None => DatarefRegistry::new(),
    };

    let compiler = Obj8Compiler::new(config)
        .with_registry(registry)
        .with_datarefs(scene.datarefs.clone());
    let report = compiler.export_to_path(&mut scene, output)?;

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    println!(
        "Exported {} primitives to {:?} (VT {}, VLINE {}, VLIGHT {}, IDX {})",
        report.prims,
        output,
        report.counts.vt,
        report.counts.vline,
        report.counts.vlight,
        report.counts.idx
    );
    Ok(())
}

fn print_config(config: &CompilerConfig) {
    println!("Exporting with config:");
    println!("  - Platform: {}", config.platform.header_byte());
    println!("  - Instanced: {}", config.instanced);
    println!("  - Cockpit: {}", config.cockpit);
    if !config.cockpit_regions.is_empty() {
        println!("  - Cockpit regions: {}", config.cockpit_regions.len());
    }
    if let Some(dir) = &config.texture_dir {
        println!("  - Texture dir: {:?}", dir);
    }
}
