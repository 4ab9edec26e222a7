use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use rocket_resequencer::domain::{ChannelId, Rocket};
use rocket_resequencer::infra::{
    postgres, sqlite, MessageLog, PgAdvisoryChannelLocks, PgMessageLog, PgRocketStore,
    RocketStore, SqliteMessageLog, SqliteRocketStore,
};
use rocket_resequencer::resequencer::Resequencer;
use rocket_resequencer::server::StorageBackend;

fn print_help() {
    eprintln!(
        "\
rocket-resequencer-admin

USAGE:
  rocket-resequencer-admin <command> [options]

COMMANDS:
  migrate                         Run database migrations
  rebuild                         Replay a channel's log and overwrite its projection
  reconcile                       Fold newly contiguous messages onto a projection
  export-messages                 Export a channel's logged messages

COMMON OPTIONS:
  --database-url <url>            (defaults to env DATABASE_URL)
  --backend <postgres|sqlite>     (default: postgres, or env STORAGE_BACKEND)

rebuild / reconcile OPTIONS:
  --channel <uuid>                (required)

export-messages OPTIONS:
  --channel <uuid>                (required)
  --output <path>                 (optional) Output file path (default: stdout)
  --format <json|ndjson>          (default: ndjson)
"
    );
}

/// Options shared by every command; each command checks what it needs.
#[derive(Debug, Default)]
struct Options {
    database_url: Option<String>,
    backend: Option<StorageBackend>,
    channel: Option<ChannelId>,
    output_path: Option<String>,
    format: Option<String>,
}

impl Options {
    /// `None` when help was requested.
    fn parse(mut args: VecDeque<String>) -> anyhow::Result<Option<Self>> {
        let mut options = Options::default();
        while let Some(arg) = args.pop_front() {
            let mut value = |name: &str| {
                args.pop_front()
                    .ok_or_else(|| anyhow::anyhow!("missing value for {name}"))
            };
            match arg.as_str() {
                "--database-url" => options.database_url = Some(value("--database-url")?),
                "--backend" => {
                    options.backend = Some(
                        value("--backend")?
                            .parse::<StorageBackend>()
                            .map_err(|e: String| anyhow::anyhow!(e))?,
                    );
                }
                "--channel" => {
                    let raw = value("--channel")?;
                    options.channel = Some(
                        raw.parse::<ChannelId>()
                            .map_err(|e| anyhow::anyhow!("invalid --channel {raw:?}: {e}"))?,
                    );
                }
                "--output" => options.output_path = Some(value("--output")?),
                "--format" => options.format = Some(value("--format")?),
                "-h" | "--help" => return Ok(None),
                other => anyhow::bail!("unexpected argument: {other}"),
            }
        }
        Ok(Some(options))
    }

    fn channel(&self) -> anyhow::Result<ChannelId> {
        self.channel
            .ok_or_else(|| anyhow::anyhow!("--channel is required"))
    }

    fn backend(&self) -> anyhow::Result<StorageBackend> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => match std::env::var("STORAGE_BACKEND") {
                Ok(raw) => raw
                    .parse::<StorageBackend>()
                    .map_err(|e| anyhow::anyhow!(e))?,
                Err(_) => StorageBackend::Postgres,
            },
        };
        if backend == StorageBackend::Memory {
            anyhow::bail!("the memory backend has nothing to administer; use postgres or sqlite");
        }
        Ok(backend)
    }

    fn database_url(&self) -> anyhow::Result<String> {
        self.database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
    }
}

/// A resequencer over the configured database. Postgres gets advisory locks
/// so admin commands serialize against running servers.
async fn open_resequencer(options: &Options) -> anyhow::Result<Resequencer> {
    let database_url = options.database_url()?;
    match options.backend()? {
        StorageBackend::Postgres => {
            let pool = postgres::connect(&database_url, 5).await?;
            let lock_pool = postgres::connect(&database_url, 2).await?;
            let log: Arc<dyn MessageLog> = Arc::new(PgMessageLog::new(pool.clone()));
            let rockets: Arc<dyn RocketStore> = Arc::new(PgRocketStore::new(pool));
            Ok(Resequencer::new(log, rockets)
                .with_serializer(Arc::new(PgAdvisoryChannelLocks::new(lock_pool))))
        }
        _ => {
            let pool = sqlite::connect(&database_url, 5).await?;
            let log: Arc<dyn MessageLog> = Arc::new(SqliteMessageLog::new(pool.clone()));
            let rockets: Arc<dyn RocketStore> = Arc::new(SqliteRocketStore::new(pool));
            Ok(Resequencer::new(log, rockets))
        }
    }
}

fn print_rocket(rocket: &Rocket) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(rocket)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    let Some(options) = Options::parse(args)? else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "migrate" => {
            let database_url = options.database_url()?;
            match options.backend()? {
                StorageBackend::Postgres => {
                    let pool = postgres::connect(&database_url, 5).await?;
                    rocket_resequencer::migrations::run_postgres(&pool).await?;
                }
                _ => {
                    let pool = sqlite::connect(&database_url, 5).await?;
                    rocket_resequencer::migrations::run_sqlite(&pool).await?;
                }
            }
            println!("ok: migrations applied");
            Ok(())
        }
        "rebuild" => {
            let channel = options.channel()?;
            let resequencer = open_resequencer(&options).await?;
            match resequencer.rebuild(&channel).await? {
                Some(rocket) => {
                    print_rocket(&rocket)?;
                    eprintln!("ok: rebuilt {channel}");
                }
                None => eprintln!("skipped: message 1 for {channel} is not logged"),
            }
            Ok(())
        }
        "reconcile" => {
            let channel = options.channel()?;
            let resequencer = open_resequencer(&options).await?;
            match resequencer.reconcile(&channel).await? {
                Some(rocket) => {
                    print_rocket(&rocket)?;
                    eprintln!("ok: reconciled {channel}");
                }
                None => eprintln!("skipped: {channel} has no projection"),
            }
            Ok(())
        }
        "export-messages" => {
            let channel = options.channel()?;
            let format = options.format.as_deref().unwrap_or("ndjson");
            if !matches!(format, "json" | "ndjson") {
                anyhow::bail!("--format must be 'json' or 'ndjson'");
            }

            let resequencer = open_resequencer(&options).await?;
            let messages = resequencer.history(&channel).await?;

            let mut output: Box<dyn Write> = match &options.output_path {
                Some(path) => Box::new(std::fs::File::create(path)?),
                None => Box::new(std::io::stdout()),
            };

            if format == "json" {
                serde_json::to_writer_pretty(&mut output, &messages)?;
                writeln!(output)?;
            } else {
                for message in &messages {
                    serde_json::to_writer(&mut output, message)?;
                    writeln!(output)?;
                }
            }
            output.flush()?;

            eprintln!("ok: exported {} messages", messages.len());
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
