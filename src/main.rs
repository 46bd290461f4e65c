use clap::{Parser, Subcommand};
use habit_tracker_lib::config::{Settings, DEFAULT_CONFIG_FILE};
use habit_tracker_lib::models::{format_entry_date, HabitFilter, LogActivityPayload, ALL_HABITS};
use habit_tracker_lib::store::JsonFileStore;
use habit_tracker_lib::tracker::TrackerCore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "habit-tracker")]
#[command(about = "Log recurring habits and track rolling goal attainment")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory holding habits_data.json and activity_data.json
    #[arg(short, long, env = "HABIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long, env = "HABIT_HOST")]
        host: Option<String>,
        #[arg(long, env = "HABIT_PORT")]
        port: Option<u16>,
        /// The single account allowed to sign in
        #[arg(long, env = "HABIT_ALLOWED_EMAIL")]
        allowed_email: Option<String>,
    },
    /// Record one activity entry
    Log {
        habit_id: u32,
        /// YYYY-MM-DD; defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show habits with their cached attainment
    Habits,
    /// Show the activity log, optionally for one habit name
    Activity {
        #[arg(long, default_value = ALL_HABITS)]
        habit: String,
    },
    /// Recompute attainment for every habit
    Recompute,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = Settings::from_file(&cli.config)?;
    let from_file = loaded.is_some();
    let mut settings = loaded.unwrap_or_default();
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    if let Command::Serve { host, port, allowed_email } = &cli.command {
        if let Some(host) = host {
            settings.host = host.clone();
        }
        if let Some(port) = port {
            settings.port = *port;
        }
        if let Some(email) = allowed_email {
            settings.allowed_email = Some(email.clone());
        }
    }
    habit_tracker_lib::init_tracing(&settings).map_err(anyhow::Error::msg)?;
    if from_file {
        tracing::info!(path = %cli.config.display(), "config loaded");
    } else {
        tracing::info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    let core = TrackerCore::new(Arc::new(JsonFileStore::new(&settings.data_dir)));

    match cli.command {
        Command::Serve { .. } => habit_tracker_lib::serve(settings).await?,
        Command::Log { habit_id, date, notes } => {
            let date = date.unwrap_or_else(|| format_entry_date(core.today()));
            let entry = core.log_activity(LogActivityPayload {
                habit_id: Some(habit_id),
                date: Some(date),
                notes,
            })?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Habits => {
            for habit in core.habits()? {
                let current = habit.stats.current();
                println!(
                    "{:>3}  {:<24} {:>3}/{:<3} every {:>2}d  {:>4}%  {:?}",
                    habit.habit_id,
                    habit.habit_name,
                    current.count,
                    habit.goal_target,
                    habit.goal_period,
                    current.attainment,
                    habit.stats.attainments(),
                );
            }
        }
        Command::Activity { habit } => {
            let rows = core.activity_log(&HabitFilter::parse(Some(&habit)))?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Recompute => {
            let habits = core.recompute_all()?;
            println!("{}", serde_json::to_string_pretty(&habits)?);
        }
    }

    Ok(())
}
