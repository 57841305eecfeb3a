//! forma command line entry point

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use forma_cad::{FormaConfig, KernelContext, OpState};
use forma_core::Document;

#[derive(Parser)]
#[command(name = "forma", version, about = "Rebuild and inspect forma documents")]
struct Cli {
    /// RON file with rebuild, solver and history settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild every part studio and print the state of each op
    Rebuild {
        /// Document file (.ron or .json)
        document: PathBuf,
        /// Write the document back out, e.g. to convert between RON and JSON
        #[arg(long)]
        output: Option<PathBuf>,
        /// Exit with an error when any op fails or is blocked
        #[arg(long)]
        strict: bool,
    },
    /// List parameters with their current values
    Params {
        document: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FormaConfig> {
    let Some(path) = path else {
        return Ok(FormaConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    ron::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

fn state_label(state: &OpState) -> String {
    match state {
        OpState::Stale => "stale".into(),
        OpState::Evaluated => "ok".into(),
        OpState::Failed(msg) => format!("failed: {msg}"),
        OpState::Suppressed => "suppressed".into(),
        OpState::Blocked(dep) => format!("blocked by {dep}"),
    }
}

fn rebuild(
    config: &FormaConfig,
    path: &Path,
    output: Option<&Path>,
    strict: bool,
) -> anyhow::Result<bool> {
    let doc = Document::load(path).with_context(|| format!("loading {}", path.display()))?;
    tracing::info!("Loaded document '{}'", doc.name);

    let mut ctx = KernelContext::reference(config);
    let (built, reports) = doc.rebuild_all(&mut ctx);

    let mut clean = true;
    for (studio_id, report) in &reports {
        let Some(studio) = built.studio(*studio_id) else {
            continue;
        };
        clean &= report.is_clean();
        println!("{} ({} ops)", studio.name, studio.len());
        for op in studio.ops() {
            let state = studio.op_state(op.id).unwrap_or(OpState::Stale);
            println!("  {:<24} {:<10} {}", op.name, op.kind.type_name(), state_label(&state));
        }
        println!("  visible bodies: {}", studio.visible_bodies().len());
    }

    for assembly in built.assemblies() {
        let (_, unconstrained) = assembly.solve_bookkeeping();
        println!(
            "{}: {} instances, {} unconstrained",
            assembly.name,
            assembly.instances().count(),
            unconstrained.len()
        );
    }

    if let Some(output) = output {
        built
            .save(output)
            .with_context(|| format!("saving {}", output.display()))?;
    }
    Ok(clean || !strict)
}

fn params(path: &Path) -> anyhow::Result<bool> {
    let doc = Document::load(path).with_context(|| format!("loading {}", path.display()))?;
    let env = doc.params();
    for param in env.iter() {
        match env.error(param.id) {
            Some(err) => println!("{} = {}  ({})", param.name, param.expression, err),
            None => println!("{} = {}  -> {}", param.name, param.expression, param.value),
        }
    }
    Ok(env.errors().is_empty())
}

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forma_cad=info,forma_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let outcome = load_config(cli.config.as_deref()).and_then(|config| match &cli.command {
        Command::Rebuild {
            document,
            output,
            strict,
        } => rebuild(&config, document, output.as_deref(), *strict),
        Command::Params { document } => params(document),
    });

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
