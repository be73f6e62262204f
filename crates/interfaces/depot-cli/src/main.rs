use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use depot_cli::{commands, RetentionArgs, Settings, TransferArgs};
use depot_pipeline::DeployOptions;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Directory used as the bucket
    #[arg(long, global = true, env = "DEPOT_BUCKET_DIR")]
    bucket_dir: Option<Utf8PathBuf>,
    /// Build output directory holding the fingerprinted assets
    #[arg(long, global = true, env = "DEPOT_PUBLIC_DIR")]
    public_dir: Option<Utf8PathBuf>,
    /// Only publish keys starting with this prefix (repeatable)
    #[arg(long = "prefix", global = true)]
    prefixes: Vec<String>,
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload local assets missing from the bucket
    Upload {
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// Delete superseded and retired versions
    Clean {
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        retention: RetentionArgs,
    },
    /// Upload, run the hook, then clean
    Deploy {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_clean: bool,
        /// Command to run between upload and clean
        #[arg(long, value_name = "CMD")]
        after_upload: Option<String>,
        #[command(flatten)]
        transfer: TransferArgs,
        #[command(flatten)]
        retention: RetentionArgs,
    },
    /// Print the removal manifest
    Manifest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    let settings = Settings::load(cli.config.as_deref())?;
    let target = settings.target(cli.bucket_dir, cli.public_dir, cli.prefixes)?;

    match cli.command {
        Commands::Upload { dry_run, transfer } => {
            commands::cmd_upload(&target, settings.upload_options(&transfer), dry_run).await?;
        }
        Commands::Clean { dry_run, retention } => {
            commands::cmd_clean(&target, settings.policy(&retention), dry_run).await?;
        }
        Commands::Deploy {
            dry_run,
            no_clean,
            after_upload,
            transfer,
            retention,
        } => {
            let options = DeployOptions {
                policy: settings.policy(&retention),
                dry_run,
                clean: !no_clean,
            };
            let hook = after_upload.or_else(|| settings.after_upload.clone());
            commands::cmd_deploy(&target, settings.upload_options(&transfer), options, hook)
                .await?;
        }
        Commands::Manifest => {
            commands::cmd_manifest(&target).await?;
        }
    }

    Ok(())
}
