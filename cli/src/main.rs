// storykeep — offline-first story reader CLI
//
// Browse the story service, keep stories for later, and read them without a
// connection.

mod config;
mod view;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;

use storykeep_core::manager::{PREF_AUTO_SAVE_LIKED, PREF_OFFLINE_MODE};
use storykeep_core::{
    Category, ClearScope, ExportBundle, HttpStoryClient, ListController, LoadOutcome, LocalStore,
    NewStory, StoryApi, UserStoryManager,
};

use view::{TerminalNotifier, TerminalView};

#[derive(Parser)]
#[command(name = "storykeep")]
#[command(about = "StoryKeep — Offline-first Story Reader", long_about = None)]
#[command(version)]
struct Cli {
    /// Skip the network and read local stories only
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        name: String,
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Log in and remember the session
    Login {
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// List stories (remote, falling back to saved ones)
    List,
    /// Show one story
    Show { id: String },
    /// Upload a new story
    Add {
        #[arg(long)]
        photo: PathBuf,
        #[arg(short, long)]
        description: String,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Toggle "saved for later"
    Save { id: String },
    /// Toggle "liked"
    Like { id: String },
    /// Toggle offline availability
    Download { id: String },
    /// Download every listed story for offline reading
    DownloadAll,
    /// Show saved/liked/offline membership of a story
    Status { id: String },
    /// Show every locally kept story by category
    Mine,
    /// Export kept stories and preferences as JSON
    Export { file: Option<PathBuf> },
    /// Replace local data with an export file
    Import { file: PathBuf },
    /// Clear a category (saved, liked, offline) or everything (all)
    Clear { scope: String },
    /// Read or change preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
    },
    /// Show session and local storage usage
    Info,
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    Get { name: String },
    Set { name: String, value: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action),
        command => command,
    };

    let app = App::open(config::Config::load()?, cli.offline).await?;

    match command {
        Commands::Register {
            name,
            email,
            password,
        } => app.cmd_register(&name, &email, &password).await,
        Commands::Login { email, password } => app.cmd_login(&email, &password).await,
        Commands::Logout => app.cmd_logout().await,
        Commands::List => app.cmd_list().await,
        Commands::Show { id } => app.cmd_show(&id).await,
        Commands::Add {
            photo,
            description,
            lat,
            lon,
        } => app.cmd_add(photo, description, lat, lon).await,
        Commands::Save { id } => app.cmd_toggle(&id, Category::Saved).await,
        Commands::Like { id } => app.cmd_toggle(&id, Category::Liked).await,
        Commands::Download { id } => app.cmd_toggle(&id, Category::Offline).await,
        Commands::DownloadAll => app.cmd_download_all().await,
        Commands::Status { id } => app.cmd_status(&id).await,
        Commands::Mine => app.cmd_mine().await,
        Commands::Export { file } => app.cmd_export(file).await,
        Commands::Import { file } => app.cmd_import(&file).await,
        Commands::Clear { scope } => app.cmd_clear(&scope).await,
        Commands::Prefs { action } => app.cmd_prefs(action).await,
        Commands::Info => app.cmd_info().await,
        Commands::Config { .. } => Ok(()),
    }
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else if key == "storage_path" {
                println!("{} = {}", key.bright_cyan(), config.storage_dir()?.display());
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<22} {}", key.bright_cyan(), value);
            }
            println!();
            println!("  File: {}", config::Config::config_file()?.display().to_string().dimmed());
        }
    }

    Ok(())
}

/// Wired-up store, manager and API client for one command.
struct App {
    config: config::Config,
    store: Arc<LocalStore>,
    manager: Arc<UserStoryManager>,
    api: Arc<HttpStoryClient>,
    offline: bool,
}

impl App {
    async fn open(config: config::Config, offline: bool) -> Result<Self> {
        let storage_dir = config.storage_dir()?;
        let store = Arc::new(LocalStore::persistent(&storage_dir));
        store
            .init()
            .await
            .with_context(|| format!("Failed to open local store at {}", storage_dir.display()))?;

        let manager = Arc::new(UserStoryManager::with_notifier(
            store.clone(),
            config.manager_config(),
            Arc::new(TerminalNotifier),
        ));

        let api = Arc::new(
            HttpStoryClient::new(config.client_config()).context("Failed to create API client")?,
        );
        if let Some(session) = store.load_session().await? {
            tracing::debug!("Restored session for {}", session.name);
            api.set_token(Some(session.token));
        }

        Ok(Self {
            config,
            store,
            manager,
            api,
            offline,
        })
    }

    fn controller(&self) -> ListController {
        ListController::new(
            self.api.clone(),
            self.manager.clone(),
            Arc::new(TerminalView),
            self.config.controller_config(!self.offline),
        )
    }

    /// Load the listing; false when nothing could be shown.
    async fn load(&self, controller: &ListController) -> bool {
        !matches!(
            controller.load().await,
            LoadOutcome::Unauthenticated | LoadOutcome::Coalesced
        )
    }

    async fn cmd_register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let message = self.api.register(name, email, password).await?;
        println!("{} {}", "✓".green(), message);
        println!(
            "  Next: {}",
            format!("storykeep login {} --password <password>", email).bright_green()
        );
        Ok(())
    }

    async fn cmd_login(&self, email: &str, password: &str) -> Result<()> {
        let session = self.api.login(email, password).await?;
        self.store
            .save_session(&session)
            .await
            .context("Failed to store session")?;
        println!("{} Logged in as {}", "✓".green(), session.name.bright_cyan());
        Ok(())
    }

    async fn cmd_logout(&self) -> Result<()> {
        self.store.clear_session().await?;
        self.api.set_token(None);
        println!("{} Logged out (kept stories stay on this device)", "✓".green());
        Ok(())
    }

    async fn cmd_list(&self) -> Result<()> {
        let controller = self.controller();
        self.load(&controller).await;
        Ok(())
    }

    async fn cmd_show(&self, id: &str) -> Result<()> {
        if !self.offline {
            match self.api.get_story(id).await {
                Ok(story) => {
                    view::print_story(&story);
                    let status = self.manager.status(id).await?;
                    if status.has_any_status {
                        println!();
                        println!("  {}", view::badges(&status));
                    }
                    return Ok(());
                }
                Err(e) if e.is_connectivity() => {
                    tracing::warn!("Remote detail failed, trying local copy: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let user_stories = self.manager.all_user_stories().await?;
        let story = user_stories
            .unique_stories()
            .into_iter()
            .find(|s| s.id == id)
            .with_context(|| format!("Story {} is not available offline", id))?;
        println!("{}", "(offline copy)".dimmed());
        view::print_story(&story);
        Ok(())
    }

    async fn cmd_add(
        &self,
        photo: PathBuf,
        description: String,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<()> {
        let bytes = std::fs::read(&photo)
            .with_context(|| format!("Failed to read photo {}", photo.display()))?;
        let photo_name = photo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_string());

        let message = self
            .api
            .add_story(NewStory {
                description,
                photo: bytes,
                photo_name,
                lat,
                lon,
            })
            .await?;
        println!("{} {}", "✓".green(), message);
        Ok(())
    }

    async fn cmd_toggle(&self, id: &str, category: Category) -> Result<()> {
        let controller = self.controller();
        if !self.load(&controller).await {
            return Ok(());
        }
        println!();
        let active = match category {
            Category::Saved => controller.toggle_save(id).await?,
            Category::Liked => controller.toggle_like(id).await?,
            Category::Offline => controller.toggle_download(id).await?,
        };
        tracing::debug!("{} {} -> {}", id, category, active);
        Ok(())
    }

    async fn cmd_download_all(&self) -> Result<()> {
        let controller = self.controller();
        if !self.load(&controller).await {
            return Ok(());
        }
        let downloaded = controller
            .download_all_visible(|done, total| {
                println!("  {} {}/{}", "↓".bright_blue(), done, total);
            })
            .await?;
        tracing::info!("download-all finished with {} stories", downloaded);
        Ok(())
    }

    async fn cmd_status(&self, id: &str) -> Result<()> {
        let status = self.manager.status(id).await?;
        println!("{}", format!("Status of {}", id).bold());
        for category in Category::ALL {
            let mark = if status.contains(category) {
                "✓".green()
            } else {
                "·".dimmed()
            };
            println!("  {} {}", mark, category);
        }
        Ok(())
    }

    async fn cmd_mine(&self) -> Result<()> {
        let stories = self.manager.all_user_stories().await?;
        if stories.total == 0 {
            println!("{}", "No kept stories yet.".dimmed());
            return Ok(());
        }

        for category in Category::ALL {
            let records = stories.category(category);
            println!("{} ({})", category.to_string().bold(), records.len());
            for record in records {
                let when = record
                    .stamp()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "  {} {} {}",
                    "•".bright_green(),
                    record.story.name.bright_cyan(),
                    when.dimmed()
                );
            }
            println!();
        }
        Ok(())
    }

    async fn cmd_export(&self, file: Option<PathBuf>) -> Result<()> {
        let bundle = self.manager.export_all().await?;
        let json = bundle.to_json_pretty()?;

        match file {
            Some(path) => {
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!(
                    "{} Exported {} stories to {}",
                    "✓".green(),
                    bundle.user_stories.total,
                    path.display().to_string().bright_cyan()
                );
            }
            None => println!("{}", json),
        }
        Ok(())
    }

    async fn cmd_import(&self, file: &Path) -> Result<()> {
        let json = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let bundle = ExportBundle::from_json(&json)?;
        println!(
            "  Export from {} (format {})",
            bundle.export_date.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            bundle.version
        );
        self.manager.import_all(&bundle).await?;
        Ok(())
    }

    async fn cmd_clear(&self, scope: &str) -> Result<()> {
        let scope: ClearScope = scope.parse().map_err(anyhow::Error::msg)?;
        if !self.manager.clear(scope).await? {
            anyhow::bail!("Failed to clear local data");
        }
        Ok(())
    }

    async fn cmd_prefs(&self, action: Option<PrefsAction>) -> Result<()> {
        match action {
            None => {
                println!("{}", "Preferences".bold());
                println!(
                    "  {:<16} {}",
                    PREF_AUTO_SAVE_LIKED.bright_cyan(),
                    self.manager.auto_save_liked().await?
                );
                println!(
                    "  {:<16} {}",
                    PREF_OFFLINE_MODE.bright_cyan(),
                    self.manager.offline_mode().await?
                );
            }

            Some(PrefsAction::Get { name }) => {
                let value = match name.as_str() {
                    PREF_AUTO_SAVE_LIKED => self.manager.auto_save_liked().await?,
                    PREF_OFFLINE_MODE => self.manager.offline_mode().await?,
                    _ => anyhow::bail!("Unknown preference: {}", name),
                };
                println!("{} = {}", name.bright_cyan(), value);
            }

            Some(PrefsAction::Set { name, value }) => {
                let enabled: bool = value.parse().context("Invalid boolean value")?;
                let ok = match name.as_str() {
                    PREF_AUTO_SAVE_LIKED => self.manager.set_auto_save_liked(enabled).await?,
                    PREF_OFFLINE_MODE => self.manager.set_offline_mode(enabled).await?,
                    _ => anyhow::bail!("Unknown preference: {}", name),
                };
                if !ok {
                    anyhow::bail!("Failed to store preference {}", name);
                }
                println!("{} Set {} = {}", "✓".green(), name.bright_cyan(), enabled);
            }
        }
        Ok(())
    }

    async fn cmd_info(&self) -> Result<()> {
        println!("{}", "Session".bold());
        match self.store.load_session().await? {
            Some(session) => println!("  Logged in as {}", session.name.bright_cyan()),
            None => println!("  {}", "(not logged in)".dimmed()),
        }
        println!();

        let report = self.manager.storage_report().await?;
        println!("{}", "Local storage".bold());
        for (category, entry) in [
            (Category::Saved, &report.saved),
            (Category::Liked, &report.liked),
            (Category::Offline, &report.offline),
        ] {
            let updated = entry
                .last_updated
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<10} {:>4} stories  {:>10}  updated {}",
                category.to_string().bright_cyan(),
                entry.count,
                entry.size,
                updated.dimmed()
            );
        }
        println!(
            "  {:<10} {:>4} stories  {:>10}",
            "total".bold(),
            report.total_count,
            report.total_size
        );
        println!();
        println!(
            "  Store: {}",
            self.config.storage_dir()?.display().to_string().dimmed()
        );
        Ok(())
    }
}
