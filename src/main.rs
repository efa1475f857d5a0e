//! Palhost - plugin host runtime for live results and hot-reloaded dev plugins.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use palhost::ai_command::{
    parse_commands, AiCommandPlugin, AI_TRIGGER_KEYWORD, COMMANDS_SETTING_KEY,
};
use palhost::dev::{
    DevPluginManager, RemoveOutcome, DEV_ADD, DEV_LIST, DEV_REMOVE, DEV_TRIGGER_KEYWORD,
};
use palhost::result::{PluginQuery, RefreshScheduler};
use palhost::stream::{ChatBackend, EchoBackend, StallPolicy};
use palhost::{Config, ConsoleHost, JsonSettingsStore, LocalPluginManager, SettingsStore};

/// Plugin host for live-refreshing launcher results
#[derive(Parser)]
#[command(name = "palhost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to .palhost.toml, then the user config)
    #[arg(long, global = true, env = "PALHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Plugin settings file
    #[arg(long, global = true, env = "PALHOST_SETTINGS")]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage plugins under development
    Dev {
        #[command(subcommand)]
        operation: DevOperation,
    },

    /// Load dev plugins and hot-reload them until interrupted
    Watch,

    /// Run an AI command and stream its answer
    Ask {
        /// Command keyword
        command: String,

        /// Input text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,

        /// Echo the input back instead of contacting the model server
        #[arg(long)]
        offline: bool,
    },

    /// List configured AI commands
    Commands,
}

#[derive(Subcommand)]
enum DevOperation {
    /// Register a plugin directory
    Add {
        /// Plugin source directory
        directory: PathBuf,
    },

    /// Unregister a plugin directory
    Remove {
        /// Plugin source directory
        directory: String,

        /// Also delete the directory from disk
        #[arg(long)]
        delete: bool,
    },

    /// Show registered dev plugins
    List,

    /// Reload every dev plugin once
    Reload,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().unwrap_or_default(),
    };

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let settings = open_settings(cli.settings.as_deref(), &config)?;
    let host = Arc::new(
        ConsoleHost::new().with_desktop_notifications(config.general.desktop_notifications),
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match cli.command {
            Commands::Dev { operation } => cmd_dev(operation, &config, settings).await,
            Commands::Watch => cmd_watch(&config, settings, host).await,
            Commands::Ask { command, text, offline } => {
                cmd_ask(&config, settings, host, &command, &text.join(" "), offline).await
            }
            Commands::Commands => cmd_commands(settings.as_ref()),
        }
    })
}

fn open_settings(path: Option<&Path>, config: &Config) -> Result<Arc<JsonSettingsStore>> {
    let path = path.map(Path::to_path_buf).or_else(|| config.settings_path());
    let store = match path {
        Some(path) => JsonSettingsStore::open(&path)
            .with_context(|| format!("Failed to open settings {}", path.display()))?,
        None => JsonSettingsStore::in_memory(),
    };
    Ok(Arc::new(store))
}

fn dev_manager(
    config: &Config,
    settings: Arc<JsonSettingsStore>,
    host: Arc<ConsoleHost>,
) -> Result<DevPluginManager> {
    let plugins = Arc::new(LocalPluginManager::new());
    Ok(DevPluginManager::new(plugins, settings, host, config.dev.clone())?)
}

async fn cmd_dev(
    operation: DevOperation,
    config: &Config,
    settings: Arc<JsonSettingsStore>,
) -> Result<()> {
    match operation {
        DevOperation::Add { directory } => {
            let directory = std::fs::canonicalize(&directory)
                .with_context(|| format!("Directory {} does not exist", directory.display()))?;
            let host = Arc::new(ConsoleHost::new().with_picked_directory(directory.clone()));
            let manager = dev_manager(config, settings, host)?;
            manager.load_all()?;

            let before = manager.directories().len();
            manager.query(&PluginQuery::input(DEV_TRIGGER_KEYWORD, DEV_ADD, ""));
            if manager.directories().len() > before {
                match manager.loaded().iter().find(|p| p.directory == directory) {
                    Some(plugin) => {
                        println!("Added {} ({})", directory.display(), plugin.metadata.name);
                    }
                    None => println!("Added {} (metadata not loaded)", directory.display()),
                }
            }
        }
        DevOperation::Remove { directory, delete } => {
            let manager = dev_manager(config, settings, Arc::new(ConsoleHost::new()))?;
            manager.load_all()?;

            if delete {
                let path = PathBuf::from(shellexpand::tilde(&directory).as_ref());
                match manager.remove_directory(&path, true)? {
                    RemoveOutcome::Removed => println!("Removed and deleted {}", path.display()),
                    RemoveOutcome::NotFound => println!("Directory not found"),
                }
            } else {
                let before = manager.directories().len();
                let query = PluginQuery::input(DEV_TRIGGER_KEYWORD, DEV_REMOVE, directory.as_str());
                manager.query(&query);
                if manager.directories().len() < before {
                    println!("Removed {directory}");
                }
            }
        }
        DevOperation::List => {
            let manager = dev_manager(config, settings, Arc::new(ConsoleHost::new()))?;
            manager.load_all()?;

            if manager.directories().is_empty() {
                println!("No dev plugin directories registered");
                return Ok(());
            }
            for result in manager.query(&PluginQuery::input(DEV_TRIGGER_KEYWORD, DEV_LIST, "")) {
                println!("{}", result.state.title);
                if !result.state.preview.content.is_empty() {
                    println!("{}", result.state.preview.content);
                }
            }
        }
        DevOperation::Reload => {
            let manager = dev_manager(config, settings, Arc::new(ConsoleHost::new()))?;
            let report = manager.full_reload("reload by user").await?;
            println!("Reloaded {} of {} dev plugins", report.reloaded.len(), report.total());
            for id in &report.failed {
                println!("  failed: {id}");
            }
        }
    }
    Ok(())
}

async fn cmd_watch(
    config: &Config,
    settings: Arc<JsonSettingsStore>,
    host: Arc<ConsoleHost>,
) -> Result<()> {
    let manager = dev_manager(config, settings, host)?;
    let startup_pass = manager.start();

    let loaded = manager.loaded();
    println!("Watching {} dev plugins. Press Ctrl-C to stop.", loaded.len());
    for plugin in &loaded {
        let watching = if manager.is_watching(plugin.id()) { "" } else { " (no build output)" };
        println!("  {} {}{watching}", plugin.metadata.name, plugin.directory.display());
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    startup_pass.abort();
    println!("Stopped");
    Ok(())
}

async fn cmd_ask(
    config: &Config,
    settings: Arc<JsonSettingsStore>,
    host: Arc<ConsoleHost>,
    command: &str,
    text: &str,
    offline: bool,
) -> Result<()> {
    if !config.ai.enabled {
        anyhow::bail!("AI commands are disabled in the configuration");
    }

    let plugin = AiCommandPlugin::new(chat_backend(config, offline), settings, host)
        .with_refresh_interval(config.refresh.default_interval_ms)
        .with_stall_policy(
            config.ai.stall_timeout().map_or_else(StallPolicy::none, StallPolicy::after),
        );

    let query = PluginQuery::input(AI_TRIGGER_KEYWORD, command, text);
    let Some(result) = plugin.query(&query).into_iter().next() else {
        anyhow::bail!("No result for command {command}");
    };

    let scheduler = RefreshScheduler::new();
    let handle = scheduler.display(result);
    let mut updates = handle.subscribe();
    let mut printed = 0;
    let mut stdout = io::stdout();

    loop {
        let state = updates.borrow_and_update().clone();
        let content = &state.preview.content;
        if content.len() >= printed && content.is_char_boundary(printed) {
            write!(stdout, "{}", &content[printed..])?;
            printed = content.len();
        } else {
            // Preview was rewritten; start over on a new line.
            write!(stdout, "\n{content}")?;
            printed = content.len();
        }
        stdout.flush()?;

        if state.is_terminal() {
            if printed == 0 {
                write!(stdout, "{}", state.title)?;
            }
            writeln!(stdout)?;
            if !state.subtitle.is_empty() {
                eprintln!("{}", state.subtitle);
            }
            break;
        }
        if updates.changed().await.is_err() {
            writeln!(stdout)?;
            break;
        }
    }
    Ok(())
}

fn chat_backend(config: &Config, offline: bool) -> Arc<dyn ChatBackend> {
    if offline {
        return Arc::new(EchoBackend::default());
    }

    #[cfg(feature = "ai")]
    {
        Arc::new(
            palhost::stream::OllamaBackend::new()
                .with_base_url(config.ai.base_url.clone())
                .with_model(config.ai.default_model.clone()),
        )
    }

    #[cfg(not(feature = "ai"))]
    {
        let _ = config;
        tracing::warn!("Built without the ai feature, echoing input instead");
        Arc::new(EchoBackend::default())
    }
}

fn cmd_commands(settings: &JsonSettingsStore) -> Result<()> {
    let commands = parse_commands(&settings.get_setting(COMMANDS_SETTING_KEY))
        .context("Failed to parse AI commands")?;

    if commands.is_empty() {
        println!("No AI commands configured");
        return Ok(());
    }

    println!("{:<12} {:<24} {:<8} MODEL", "COMMAND", "NAME", "VISION");
    for command in &commands {
        println!(
            "{:<12} {:<24} {:<8} {}",
            command.command,
            command.name,
            if command.vision { "yes" } else { "no" },
            command.ai_model()
        );
    }
    Ok(())
}
