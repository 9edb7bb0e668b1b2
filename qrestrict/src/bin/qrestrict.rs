use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use qrestrict::{
    RestrictConfig, RestrictPass,
    io::restrict_file,
    restrict::{DEFAULT_BIAS_SCALE_TOLERANCE, DEFAULT_OUTPUT_SCALE_MARGIN, DEFAULT_SCALE_TOLERANCE},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Quantized model to restrict (.json or .msgpack)
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the restricted model (.json or .msgpack)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run the pass and report what it would change without writing anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Two scales closer than this are considered equal
    #[arg(long, env = "QRESTRICT_SCALE_TOLERANCE", default_value_t = DEFAULT_SCALE_TOLERANCE)]
    scale_tolerance: f64,

    /// Maximum distance between a bias scale and input_scale * weight_scale
    #[arg(long, env = "QRESTRICT_BIAS_SCALE_TOLERANCE", default_value_t = DEFAULT_BIAS_SCALE_TOLERANCE)]
    bias_scale_tolerance: f64,

    /// Margin added to input_scale * weight_scale when an output scale is too small
    #[arg(long, env = "QRESTRICT_OUTPUT_SCALE_MARGIN", default_value_t = DEFAULT_OUTPUT_SCALE_MARGIN)]
    output_scale_margin: f64,
}

fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting global subscriber")?;

    let args = Args::parse();
    if args.output.is_none() && !args.dry_run {
        anyhow::bail!("--output is required unless --dry-run is given");
    }

    let pass = RestrictPass::new(RestrictConfig {
        scale_tolerance: args.scale_tolerance,
        bias_scale_tolerance: args.bias_scale_tolerance,
        output_scale_margin: args.output_scale_margin,
    });
    info!("restricting {} with {:?}", args.input.display(), pass.config());
    let output = args.output.filter(|_| !args.dry_run);
    let stats = restrict_file(&pass, &args.input, output.as_ref())?;
    match output {
        Some(output) => info!("restricted model written to {}: {stats:?}", output.display()),
        None => info!("dry run: {stats:?}"),
    }
    Ok(())
}
