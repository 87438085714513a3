pub mod output;

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    config::Settings,
    provider::{efficiency::fetch_productivity_efficiency, rescuetime::RescueTimeClient},
    query::{window::DeadlineHour, ScoreSet, StatsQuery},
    storage::{entities::ProductivityScore, record_storage::StatsStorage},
    sync::SyncEngine,
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, QUERY_PREFIX, SYNC_PREFIX},
    },
};

use output::{format_duration, print_report};

#[derive(Parser, Debug)]
#[command(name = "rescuesync", version, long_about = None)]
#[command(about = "Keeps a local cache of RescueTime statistics and answers questions about it")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    settings: Settings,
    #[arg(long, global = true, help = "Print logs to the console")]
    log: bool,
    #[arg(
        long,
        global = true,
        default_value = "0",
        help = "Hour at which the reported day starts. With 18 the day runs from 18:00 to 18:00"
    )]
    deadline_hour: DeadlineHour,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Fetch every missing or outdated day. This is the default command")]
    Sync,
    #[command(about = "Time spent on an activity, category or subcategory in the current day")]
    Activity {
        #[arg(help = "Name as shown by RescueTime, case is ignored")]
        name: String,
    },
    #[command(about = "Time spent in productivity levels in the current day")]
    Productivity {
        #[arg(
            required = true,
            allow_negative_numbers = true,
            help = "Levels from -2 (very distracting) to 2 (very productive)"
        )]
        scores: Vec<ProductivityScore>,
    },
    #[command(about = "Total time tracked in the current day")]
    Total,
    #[command(about = "Efficiency percentage of a day as RescueTime computes it")]
    Efficiency {
        #[arg(long, help = "Day to compute efficiency for. Today by default")]
        date: Option<NaiveDate>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Commands::Sync);

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let prefix = match command {
        Commands::Sync | Commands::Efficiency { .. } => SYNC_PREFIX,
        _ => QUERY_PREFIX,
    };
    let app_dir = create_application_default_path()?;
    enable_logging(prefix, &app_dir, logging_level, args.log)?;

    let clock = DefaultClock;
    let as_of = clock.as_of();
    let storage = StatsStorage::new(args.settings.stats_root(&app_dir))?;
    let query = StatsQuery::new(storage.clone(), args.deadline_hour, as_of);

    match command {
        Commands::Sync => run_sync(&args.settings, storage, as_of).await,
        Commands::Activity { name } => {
            println!("{}", format_duration(query.activity_seconds(&name).await?));
            Ok(())
        }
        Commands::Productivity { scores } => {
            let scores = scores.into_iter().collect::<ScoreSet>();
            println!("{}", format_duration(query.productivity_seconds(scores).await?));
            Ok(())
        }
        Commands::Total => {
            println!("{}", format_duration(query.total_tracked_seconds().await?));
            Ok(())
        }
        Commands::Efficiency { date } => {
            let client =
                RescueTimeClient::new(args.settings.api_key()?.to_owned(), Box::new(clock))?;
            let date = date.unwrap_or(as_of.date());
            println!("{}", fetch_productivity_efficiency(&client, date).await?);
            Ok(())
        }
    }
}

async fn run_sync(settings: &Settings, storage: StatsStorage, as_of: NaiveDateTime) -> Result<()> {
    let client = RescueTimeClient::new(settings.api_key()?.to_owned(), Box::new(DefaultClock))?;
    let engine = SyncEngine::new(client, storage);

    info!("Synchronizing from {} to {}", settings.since(), as_of.date());
    let report = engine
        .synchronize(settings.since(), as_of.date(), as_of)
        .await?;
    print_report(&report);

    if !report.is_clean() {
        bail!(
            "{} records couldn't be synchronized",
            report.problems().count()
        );
    }
    Ok(())
}
