use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use matslot::config::Config;
use matslot::materials::types::FileUpload;
use matslot::materials::{
    ApiClient, Confirm, LogNotifier, MaterialsPanel, Notice, NoticeLevel, Notifier, RestTableQuery,
    Selection, TableQuery,
};
use matslot::slots::{SlotState, SlotView};
use matslot::{logging, PortalError, Result};

/// Manage the per-course material slots of the department portal.
#[derive(Parser)]
#[command(name = "matslot", version, about = "Upload and manage course material slots")]
struct Cli {
    #[arg(long, global = true, default_value = "")]
    programme: String,
    #[arg(long, global = true, default_value = "")]
    level: String,
    #[arg(long, global = true, default_value = "")]
    course: String,
    /// Send notices to the log instead of the terminal.
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the courses for a programme and level.
    Courses,
    /// Show the slots of the selected course.
    List,
    /// Upload a file into an empty slot.
    Upload { slot: usize, file: PathBuf },
    /// Upload several files in one go.
    UploadAll {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete the material in a slot.
    Delete {
        slot: usize,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Print a signed URL for viewing a slot's material.
    View { slot: usize },
    /// Save a slot's material to disk.
    Download {
        slot: usize,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => println!("✓ {}", notice.message),
            NoticeLevel::Error => eprintln!("✗ {}", notice.message),
        }
    }
}

struct PromptConfirm {
    assume_yes: bool,
}

impl Confirm for PromptConfirm {
    fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", message);
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(config.log_dir.as_deref());

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("command failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let api = Arc::new(ApiClient::new(&config.api_url));
    log::info!("Portal API: {}", api.base_url());
    let fallback = config
        .fallback()
        .map(|(url, key)| Arc::new(RestTableQuery::new(url, key)) as Arc<dyn TableQuery>);
    let settings = config.panel_settings();
    let notifier: Arc<dyn Notifier> = if cli.quiet {
        Arc::new(LogNotifier)
    } else {
        Arc::new(ConsoleNotifier)
    };
    let panel = MaterialsPanel::new(api, fallback, notifier, settings);

    let selection = Selection::new(&cli.programme, &cli.level, &cli.course);
    match cli.command {
        Command::Courses => {
            for course in panel.list_courses(&selection.programme, &selection.level).await? {
                println!("{} - {}", course.code, course.title);
            }
        }
        Command::List => {
            open_course(&panel, &selection).await?;
            print_slots(&panel.slot_views());
        }
        Command::Upload { slot, file } => {
            open_course(&panel, &selection).await?;
            let upload = read_upload(&file).await?;
            panel.upload_to_slot(slot, upload).await?;
            settle(&panel, settings.slot_reload_delay).await;
            print_slots(&panel.slot_views());
        }
        Command::UploadAll { files } => {
            open_course(&panel, &selection).await?;
            let mut uploads = Vec::with_capacity(files.len());
            for file in &files {
                uploads.push(read_upload(file).await?);
            }
            panel.upload_batch(uploads).await?;
            settle(&panel, settings.batch_reload_delay).await;
            print_slots(&panel.slot_views());
        }
        Command::Delete { slot, yes } => {
            open_course(&panel, &selection).await?;
            panel
                .delete_slot(slot, &PromptConfirm { assume_yes: yes })
                .await?;
            settle(&panel, settings.delete_reload_delay).await;
            print_slots(&panel.slot_views());
        }
        Command::View { slot } => {
            open_course(&panel, &selection).await?;
            println!("{}", panel.view_slot(slot).await?);
        }
        Command::Download { slot, dir } => {
            open_course(&panel, &selection).await?;
            let path = panel.download_slot(slot, &dir).await?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Select the course from the global flags and wait for its slots to load.
async fn open_course(panel: &Arc<MaterialsPanel>, selection: &Selection) -> Result<()> {
    if selection.course.is_empty() {
        eprintln!("✗ {}", PortalError::NoCourseSelected);
        return Err(PortalError::NoCourseSelected);
    }
    panel.select_course(&selection.programme, &selection.level, &selection.course);
    panel.queue().wait_idle().await;
    Ok(())
}

/// Let the post-action reload fire and finish.
async fn settle(panel: &Arc<MaterialsPanel>, delay: Duration) {
    tokio::time::sleep(delay + panel.queue().policy().debounce).await;
    panel.queue().wait_idle().await;
}

async fn read_upload(path: &Path) -> Result<FileUpload> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        eprintln!("✗ Cannot read {}: {}", path.display(), e);
        PortalError::Io(e)
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(FileUpload::new(&filename, bytes))
}

fn print_slots(views: &[SlotView]) {
    for view in views {
        match view.state {
            SlotState::Occupied => println!("{:>2}  {}", view.index, view.label),
            SlotState::Empty => println!("{:>2}  {} ({})", view.index, view.label, view.status),
        }
    }
}
