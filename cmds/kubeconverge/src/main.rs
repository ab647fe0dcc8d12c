use anyhow::Result;
use clap::{Parser, Subcommand};
use kubeconverge::{
	commands::{self, util::BrokenPipeGuard},
	telemetry,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "kubeconverge")]
#[command(about = "Converge Kubernetes resources towards manifests on disk", long_about = None)]
#[command(version)]
struct Cli {
	/// Log level (trace, debug, info, warn, error). Overrides RUST_LOG
	#[arg(long, global = true)]
	log_level: Option<Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Create or replace cluster resources that differ from the manifests
	Apply(commands::apply::ApplyArgs),

	/// Print the lifecycle playbook for the manifests
	Plan(commands::plan::PlanArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let _telemetry = telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Apply(args) => commands::apply::run(args, stdout),
		Commands::Plan(args) => commands::plan::run(args, stdout),
	}
}
