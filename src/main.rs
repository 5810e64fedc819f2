use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use handymemo_lib::config::Config;
use handymemo_lib::error::{Error, Result};
use handymemo_lib::index::scheduler::IndexingStatus;
use handymemo_lib::intents::compose_shared_text;
use handymemo_lib::settings::WidgetSetting;
use handymemo_lib::view::paging::{MemoPager, MemoQuery};
use handymemo_lib::view::year_month::YearMonth;
use handymemo_lib::view::derive_query;
use handymemo_lib::App;

#[derive(Parser)]
#[command(name = "handymemo", version, about = "Index and browse a folder of Markdown memos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Choose the memo vault directory and index it
    SetRoot { path: PathBuf },
    /// Run one indexing pass now and print its report
    Index,
    /// List cached memos, newest first
    List {
        /// Month to show, as YYYY-MM (defaults to the current month)
        #[arg(long)]
        month: Option<String>,
        /// Whitespace-separated keywords; searches every month
        #[arg(long)]
        search: Option<String>,
        /// List every memo regardless of month
        #[arg(long, conflicts_with_all = ["month", "search"])]
        all: bool,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Show one memo with its attachments
    Show {
        /// Cache key, e.g. memos/2024/05/20240515120000.md
        path: String,
    },
    /// Create a memo; `-` reads the content from stdin
    New {
        content: String,
        /// Media files to copy into the vault and link
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },
    /// Build editor text from shared content
    Share {
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        title: Option<String>,
        /// Save the result as a memo instead of printing it
        #[arg(long)]
        save: bool,
    },
    /// Home-screen widget settings
    Widget {
        #[command(subcommand)]
        action: WidgetAction,
    },
    /// Settings and cache summary
    Status,
    /// Keep indexing periodically until interrupted
    Daemon,
}

#[derive(Subcommand)]
enum WidgetAction {
    /// Save the template shown by a widget
    Set {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        icon: Option<i64>,
    },
    /// Act as if the widget was tapped and print the editor text
    Tap { id: i64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    let app = App::open(config)?;

    match cli.command {
        Command::SetRoot { path } => {
            let root = path.canonicalize()?;
            let mut status = app.scheduler.subscribe();
            app.set_root(&root.to_string_lossy())?;
            println!("Memo folder set to {}", root.display());

            // the reindex runs on the scheduler; wait for it before exiting
            loop {
                match *status.borrow_and_update() {
                    IndexingStatus::Succeeded => break,
                    IndexingStatus::Failed => {
                        return Err(Error::Other(format!("indexing {} failed", root.display())));
                    }
                    IndexingStatus::Idle | IndexingStatus::Running => {}
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
            println!("{} memos cached", app.cache.count()?);
            Ok(())
        }
        Command::Index => {
            let outcome = app.indexer.run_index_pass(true).await;
            print_json(&outcome)?;
            if outcome.is_success() {
                Ok(())
            } else {
                Err(Error::Other("indexing pass did not succeed".to_string()))
            }
        }
        Command::List {
            month,
            search,
            all,
            page,
        } => {
            let query = if all {
                MemoQuery::All
            } else {
                let month = match month {
                    Some(raw) => parse_year_month(&raw)?,
                    None => YearMonth::current(&chrono::Local)?,
                };
                derive_query(search.as_deref().unwrap_or(""), &month)
            };
            let mut pager = MemoPager::new(app.cache.clone(), query, app.config.page_size);
            let items = pager.nth(page.saturating_sub(1)).transpose()?.unwrap_or_default();
            print_json(&items)
        }
        Command::Show { path } => match app.repository.memo_detail(&path).await? {
            Some(memo) => print_json(&memo),
            None => Err(Error::Other(format!("no cached memo at {}", path))),
        },
        Command::New { content, attachments } => {
            let mut text = if content == "-" {
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer
            } else {
                content
            };
            if !attachments.is_empty() {
                for insert in app.repository.attach_media(&attachments).await? {
                    text.push_str(&insert);
                }
            }
            let entry = app.repository.create_memo(&text).await?;
            println!("{}", entry.path);
            Ok(())
        }
        Command::Share {
            text,
            subject,
            title,
            save,
        } => {
            let combined = compose_shared_text(text.as_deref(), subject.as_deref(), title.as_deref());
            app.intents.on_share_received(&combined)?;
            let Some(editor_text) = app.intents.take_pending() else {
                return Err(Error::Other("nothing to share".to_string()));
            };
            if save {
                let entry = app.repository.create_memo(&editor_text).await?;
                println!("{}", entry.path);
            } else {
                println!("{}", editor_text);
            }
            Ok(())
        }
        Command::Widget { action } => match action {
            WidgetAction::Set { id, name, text, icon } => app.widgets.save(
                id,
                WidgetSetting {
                    template_name: name,
                    template_text: text,
                    icon_id: icon,
                },
            ),
            WidgetAction::Tap { id } => {
                let setting = app.widgets.get(id)?;
                app.intents.on_widget_tapped(setting.template_text.as_deref())?;
                println!("{}", app.intents.take_pending().unwrap_or_default());
                Ok(())
            }
        },
        Command::Status => {
            let settings = app.settings.snapshot()?;
            let summary = serde_json::json!({
                "root_tree_location": settings.root_tree_location,
                "cached_memos": app.cache.count()?,
                "oldest_memo_ms": app.cache.get_oldest_creation_timestamp()?,
                "db_path": app.config.db_path,
            });
            print_json(&summary)
        }
        Command::Daemon => daemon(app).await,
    }
}

async fn daemon(app: App) -> Result<()> {
    app.start()?;
    let view = app.memo_list_view()?;
    let mut generations = view.subscribe();
    let mut status = app.scheduler.subscribe();
    log::info!("[Daemon] Running; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("[Daemon] Shutting down");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                log::info!("[Daemon] Indexing status: {:?}", *status.borrow_and_update());
            }
            changed = generations.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let generation = generations.borrow_and_update().clone();
                log::info!(
                    "[Daemon] List generation {} ({} memos cached)",
                    generation.generation,
                    app.cache.count()?
                );
            }
        }
    }
}

fn parse_year_month(raw: &str) -> Result<YearMonth> {
    let invalid = || Error::Config(format!("month must be YYYY-MM, got {:?}", raw));
    let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
    let year = year.parse::<i32>().map_err(|_| invalid())?;
    let month = month.parse::<u32>().map_err(|_| invalid())?;
    YearMonth::new(year, month)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
