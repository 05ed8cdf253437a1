use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod context;
mod printer;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Manage builder instances", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new builder instance, or add and change nodes of one
    Create {
        /// Engine endpoint of the node (unix:///path or tcp://host:port)
        endpoint: Option<String>,

        /// Builder instance name
        #[arg(long)]
        name: Option<String>,

        /// Driver to use
        #[arg(long)]
        driver: Option<String>,

        /// Options for the driver (KEY=VALUE)
        #[arg(long = "driver-opt")]
        driver_opt: Vec<String>,

        /// Name of the node to create or modify
        #[arg(long)]
        node: Option<String>,

        /// Platforms the node serves (comma separated, may repeat)
        #[arg(long)]
        platform: Vec<String>,

        /// Append a node to an existing builder instead of changing it
        #[arg(long)]
        append: bool,

        /// Remove the node given by --node from the builder
        #[arg(long)]
        leave: bool,

        /// Set the builder as current
        #[arg(long = "use")]
        use_builder: bool,

        /// Boot the builder after creating it
        #[arg(long)]
        bootstrap: bool,
    },

    /// Set the current builder instance
    Use {
        /// Builder instance name ("default" resets to the implicit builder)
        name: String,

        /// Builder persists across endpoint changes
        #[arg(long)]
        global: bool,

        /// Also make it the fallback for endpoints without a selection
        #[arg(long)]
        default: bool,
    },

    /// List builder instances
    Ls,

    /// Inspect a builder instance
    Inspect {
        /// Builder instance name (defaults to the current one)
        name: Option<String>,

        /// Ensure the builder has booted before inspecting
        #[arg(long)]
        bootstrap: bool,
    },

    /// Stop a builder instance
    Stop {
        /// Builder instance name (defaults to the current one)
        name: Option<String>,
    },

    /// Remove a builder instance
    Rm {
        /// Builder instance name (defaults to the current one)
        name: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = context::Context::load().await?;
    let level = if cli.debug { "debug" } else { ctx.config.log_level.as_str() };
    kiln_core::init_observability(level);
    tracing::debug!(scope = %ctx.scope(), store = %ctx.config.store_dir, "Loaded configuration");

    match cli.command {
        Commands::Create {
            endpoint,
            name,
            driver,
            driver_opt,
            node,
            platform,
            append,
            leave,
            use_builder,
            bootstrap,
        } => {
            let opts = commands::create::CreateOptions {
                endpoint,
                name,
                driver,
                driver_opts: commands::create::parse_driver_opts(&driver_opt)?,
                node,
                platforms: platform,
                append,
                leave,
                use_builder,
                bootstrap,
            };
            commands::create::create(&ctx, opts).await?;
        }

        Commands::Use { name, global, default } => {
            commands::use_builder::use_builder(&ctx, &name, global, default).await?;
        }

        Commands::Ls => {
            commands::ls::ls(&ctx).await?;
        }

        Commands::Inspect { name, bootstrap } => {
            commands::inspect::inspect(&ctx, name.as_deref(), bootstrap).await?;
        }

        Commands::Stop { name } => {
            commands::stop::stop(&ctx, name.as_deref()).await?;
        }

        Commands::Rm { name } => {
            commands::rm::rm(&ctx, name.as_deref()).await?;
        }

        Commands::Version => {
            println!("kiln {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
