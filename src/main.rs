use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde_json::{json, Map};
use std::path::PathBuf;
use std::sync::Arc;

use tasksync::api::{api_types, TaskApi};
use tasksync::cache::{
  CacheLifecycleManager, CachePolicyEngine, CacheStorage, NoopStorage, SqliteStorage,
};
use tasksync::config::Config;
use tasksync::logging;
use tasksync::net::HttpTransport;
use tasksync::sync::{Identifier, Mutation, Snapshot, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "tasksync")]
#[command(about = "Task list client with optimistic updates and an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tasksync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List active tasks
  Tasks {
    #[arg(long, default_value_t = 1)]
    page: u32,
  },
  /// List archived tasks
  Archives {
    #[arg(long, default_value_t = 1)]
    page: u32,
  },
  /// Add a task
  Add {
    #[arg(required = true)]
    description: Vec<String>,
  },
  /// Archive a task by id
  Archive { id: String },
  /// Permanently delete an archived task by id
  Delete { id: String },
  /// Manage the response cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Pre-warm the static generation with the application shell
  Install,
  /// Delete cache generations that are no longer configured
  Activate,
  /// Show cache generations
  List,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let _guard = logging::init(&config.log_level, &logging::default_log_dir()?)?;

  if config.cache.enabled {
    let storage = match &config.cache.path {
      Some(path) => SqliteStorage::open(path)?,
      None => SqliteStorage::open_default()?,
    };
    run(&config, Arc::new(storage), args.command).await
  } else {
    run(&config, Arc::new(NoopStorage), args.command).await
  }
}

async fn run<S: CacheStorage>(config: &Config, storage: Arc<S>, command: Command) -> Result<()> {
  let transport = Arc::new(HttpTransport::new());
  let engine = CachePolicyEngine::new(
    Arc::clone(&storage),
    Arc::clone(&transport),
    config.cache.clone(),
  );
  let api = TaskApi::new(engine, config.api_base()?);
  let sync = SyncEngine::new(config.sync.rollback);
  let list = api_types::list_adapter();

  match command {
    Command::Tasks { page } => {
      sync.fetch_data(&list, || api.tasks(page)).await?;
      print_records(&sync.snapshot(), "TODO");
    }
    Command::Archives { page } => {
      sync.fetch_data(&list, || api.archives(page)).await?;
      print_records(&sync.snapshot(), "Finished");
    }
    Command::Add { description } => {
      let description = description.join(" ");
      sync.fetch_data(&list, || api.tasks(1)).await?;

      let mut fields = Map::new();
      fields.insert("TODO".to_string(), json!(description));
      let response = sync
        .optimistic_update(Mutation::Add(fields), &api_types::add_adapter(), || {
          api.add(&description)
        })
        .await?;

      print_message(&response);
      print_records(&sync.snapshot(), "TODO");
    }
    Command::Archive { id } => {
      let id = Identifier::parse(&id)?;
      sync.fetch_data(&list, || api.tasks(1)).await?;

      let response = sync
        .optimistic_update(
          Mutation::Remove { id },
          &api_types::archive_adapter(),
          || api.archive(&id),
        )
        .await?;

      print_message(&response);
      print_records(&sync.snapshot(), "TODO");
    }
    Command::Delete { id } => {
      let id = Identifier::parse(&id)?;
      sync.fetch_data(&list, || api.archives(1)).await?;

      let response = sync
        .optimistic_update(Mutation::Remove { id }, &list, || api.perm_delete(&id))
        .await?;

      print_message(&response);
      print_records(&sync.snapshot(), "Finished");
    }
    Command::Cache(cache_command) => {
      let lifecycle = CacheLifecycleManager::new(Arc::clone(&storage), config.cache.clone());
      match cache_command {
        CacheCommand::Install => {
          let stored = lifecycle
            .install(transport.as_ref(), &config.asset_base()?)
            .await?;
          println!("Pre-cached {} resources", stored);
        }
        CacheCommand::Activate => {
          let deleted = lifecycle.activate_current()?;
          if deleted.is_empty() {
            println!("No stale generations");
          }
          for name in deleted {
            println!("Deleted {}", name);
          }
        }
        CacheCommand::List => {
          for name in storage.generation_names()? {
            println!("{}\t{} entries", name, storage.entry_count(&name)?);
          }
        }
      }
    }
  }

  Ok(())
}

fn print_records(snapshot: &Snapshot, text_field: &str) {
  if snapshot.is_empty() {
    println!("No tasks found");
    return;
  }
  for record in snapshot.iter() {
    match record.field_str(text_field) {
      Some(text) => println!("{}\t{}", record.id, text),
      None => println!("{}\t{}", record.id, serde_json::Value::Object(record.fields.clone())),
    }
  }
}

fn print_message(response: &serde_json::Value) {
  if let Some(message) = response.get("message").and_then(|m| m.as_str()) {
    println!("{}", message);
  }
}
