use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use facereg_core::{config::Config, FaceRegistry, Submission};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facereg")]
#[command(about = "Register a face and check later captures against it", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default search path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Where a payload comes from: a captured image file or literal text
#[derive(Args)]
#[group(required = true, multiple = false)]
struct PayloadArgs {
    /// Image file to read
    file: Option<PathBuf>,
    /// Use this text as the payload
    #[arg(long)]
    text: Option<String>,
}

impl PayloadArgs {
    fn read(self) -> anyhow::Result<Vec<u8>> {
        match (self.file, self.text) {
            (Some(path), _) => std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display())),
            (None, Some(text)) => Ok(text.into_bytes()),
            (None, None) => anyhow::bail!("No payload given"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face, replacing any previous registration
    Register {
        #[command(flatten)]
        payload: PayloadArgs,
    },
    /// Compare a capture with the registered face
    Compare {
        #[command(flatten)]
        payload: PayloadArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register if nothing is registered yet, otherwise compare
    Submit {
        #[command(flatten)]
        payload: PayloadArgs,
    },
    /// Remove the registered face
    #[command(alias = "logout")]
    Clear,
    /// Show whether a face is registered
    Status,
    /// Show configuration
    Config {
        /// Validate configuration
        #[arg(long)]
        validate: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Register { payload } => cmd_register(config, payload),
        Commands::Compare { payload, json } => cmd_compare(config, payload, json),
        Commands::Submit { payload } => cmd_submit(config, payload),
        Commands::Clear => cmd_clear(config),
        Commands::Status => cmd_status(config),
        Commands::Config { validate } => cmd_config(config, validate),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            let config = Config::load_from_path(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(Config::load()?),
    }
}

fn cmd_register(config: Config, payload: PayloadArgs) -> anyhow::Result<()> {
    let payload = payload.read()?;
    let registry = FaceRegistry::new(config)?;

    let description = registry.register(&payload)?;

    println!("✓ Face registered");
    println!("Fingerprint: {}", description.fingerprint());
    println!("Size: {} bytes", description.len());

    Ok(())
}

fn cmd_compare(config: Config, payload: PayloadArgs, json: bool) -> anyhow::Result<()> {
    let payload = payload.read()?;
    let registry = FaceRegistry::new(config)?;

    let result = registry.compare(&payload)?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!("{}", result);
    }

    Ok(())
}

fn cmd_submit(config: Config, payload: PayloadArgs) -> anyhow::Result<()> {
    let payload = payload.read()?;
    let registry = FaceRegistry::new(config)?;

    match registry.submit(&payload)? {
        Submission::Registered(description) => {
            println!("✓ Face registered");
            println!("Fingerprint: {}", description.fingerprint());
        }
        Submission::Compared(result) => println!("{}", result),
    }

    Ok(())
}

fn cmd_clear(config: Config) -> anyhow::Result<()> {
    let registry = FaceRegistry::new(config)?;
    registry.clear()?;

    println!("✓ Registration cleared");

    Ok(())
}

fn cmd_status(config: Config) -> anyhow::Result<()> {
    let registry = FaceRegistry::new(config)?;

    let Some(description) = registry.status()? else {
        println!("You're not registered");
        return Ok(());
    };

    println!("Registered face:");
    println!();
    println!("{:<15} {}", "Fingerprint", description.fingerprint());
    println!("{:<15} {} bytes", "Size", description.len());
    println!(
        "{:<15} {}",
        "Registered At",
        description.registered_at.format("%Y-%m-%d %H:%M:%S")
    );

    Ok(())
}

fn cmd_config(config: Config, validate: bool) -> anyhow::Result<()> {
    if validate {
        config.validate()?;
        println!("✓ Configuration is valid");
        return Ok(());
    }

    println!("Configuration:");
    println!();

    println!("[storage]");
    println!("  database_path = {:?}", config.storage.database_path);
    println!("  resolved_path = {:?}", config.database_dir());
    println!("  key = {:?}", config.storage.key);
    println!();

    println!("[registration]");
    println!(
        "  max_payload_bytes = {}",
        config.registration.max_payload_bytes
    );

    Ok(())
}
