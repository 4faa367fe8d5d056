mod commands;
mod render;

use clap::{Parser, Subcommand};
use mothball_core::TrickRegistry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mothball")]
#[command(version)]
#[command(about = "Put idle cloud resources into storage, bring them back intact", long_about = None)]
struct Cli {
    /// AWS region override
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS credentials profile
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Directory the .mothball state directory lives under
    #[arg(long, global = true, default_value = ".")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture pre-change state, then degrade the selected resources
    Conserve {
        /// Report planned actions without issuing any mutating call
        #[arg(long)]
        dry_run: bool,

        /// Run only these tricks (machine names, comma separated)
        #[arg(long, value_delimiter = ',', value_name = "NAMES")]
        only: Vec<String>,

        /// Leave these tricks out (machine names, comma separated)
        #[arg(long, value_delimiter = ',', value_name = "NAMES")]
        skip: Vec<String>,

        /// Only touch resources carrying this tag (repeatable)
        #[arg(long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,
    },
    /// Restore resources to the state captured by the last conserve
    Restore {
        /// Report planned actions without issuing any mutating call
        #[arg(long)]
        dry_run: bool,
    },
    /// List registered tricks
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // list only reads the registry, so it never needs resolved credentials
    if matches!(cli.command, Commands::List) {
        let config = aws_config::SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .build();
        let registry = build_registry(&config);
        commands::list::handle(&registry);
        return Ok(());
    }

    let config = load_aws_config(cli.region, cli.profile).await;
    let registry = build_registry(&config);

    let success = match cli.command {
        Commands::Conserve {
            dry_run,
            only,
            skip,
            tags,
        } => commands::conserve::handle(&registry, &cli.state_dir, dry_run, only, skip, tags).await?,
        Commands::Restore { dry_run } => {
            commands::restore::handle(&registry, &cli.state_dir, dry_run).await?
        }
        Commands::List => unreachable!("List is handled before config loading"),
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn build_registry(config: &aws_config::SdkConfig) -> TrickRegistry {
    let mut registry = TrickRegistry::new();
    mothball_aws::register_defaults(&mut registry, config);
    registry
}

async fn load_aws_config(
    region: Option<String>,
    profile: Option<String>,
) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}
