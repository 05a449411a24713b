//! Task Sync Terminal
//!
//! Line-oriented front end over a `SyncSession` backed by the in-memory store.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use task_sync::{DomainResult, Filter, MemoryStore, RecordId, SyncConfig, SyncSession, Task, TaskDraft, TaskPatch};

type Session = SyncSession<Task, MemoryStore<Task>>;

enum Command {
    Add { title: String, description: String },
    Edit { id: RecordId, description: String },
    Toggle(RecordId),
    Remove(RecordId),
    Filter(Filter),
    List,
    Stats,
    Quit,
}

fn parse_id(raw: &str) -> Result<RecordId, String> {
    raw.parse::<RecordId>().map_err(|e| format!("invalid id '{}': {}", raw, e))
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(' ') {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "add" => {
            let (title, description) = rest.split_once('|').unwrap_or((rest, ""));
            Ok(Command::Add {
                title: title.trim().to_string(),
                description: description.trim().to_string(),
            })
        }
        "edit" => {
            let (id, description) = rest.split_once(' ').ok_or("usage: edit <id> <description>")?;
            Ok(Command::Edit {
                id: parse_id(id)?,
                description: description.trim().to_string(),
            })
        }
        "toggle" => Ok(Command::Toggle(parse_id(rest)?)),
        "rm" => Ok(Command::Remove(parse_id(rest)?)),
        "filter" => rest.parse::<Filter>().map(Command::Filter).map_err(|e| e.to_string()),
        "list" | "" => Ok(Command::List),
        "stats" => Ok(Command::Stats),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}'", other)),
    }
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    println!("[{}] {:<12} {}", mark, task.id.to_string(), task.title);
    if !task.description.is_empty() {
        println!("    {}", task.description);
    }
}

async fn print_list(session: &Session, filter: Filter) {
    let tasks = session.view(filter).await;
    if tasks.is_empty() {
        match filter {
            Filter::All => println!("No tasks yet"),
            other => println!("No {} tasks", other),
        }
        return;
    }
    tasks.iter().for_each(print_task);
}

async fn print_stats(session: &Session) {
    let counts = session.counts().await;
    println!(
        "Total: {}  Active: {}  Completed: {}",
        counts.total, counts.active, counts.completed
    );
}

async fn run_command(session: &Session, config: &SyncConfig, filter: &mut Filter, command: Command) -> DomainResult<()> {
    match command {
        Command::Add { title, description } => {
            let mut draft = TaskDraft::new(title, description);
            if let Some(owner) = &config.owner_id {
                draft = draft.owned_by(owner.clone());
            }
            let id = session.create(draft).await?;
            println!("created {}", id);
        }
        Command::Edit { id, description } => session.update(&id, TaskPatch::description(description)).await?,
        Command::Toggle(id) => {
            let completed = session.toggle(&id).await?;
            println!("{} is now {}", id, if completed { "completed" } else { "active" });
        }
        Command::Remove(id) => session.delete(&id).await?,
        Command::Filter(next) => *filter = next,
        Command::List => {}
        Command::Stats => {
            print_stats(session).await;
            return Ok(());
        }
        Command::Quit => return Ok(()),
    }
    print_list(session, *filter).await;
    print_stats(session).await;
    Ok(())
}

fn report(msg: &str) {
    eprintln!("{} {}", rolling_logger::timestamp(), msg);
    let _ = rolling_logger::error(msg);
}

fn load_config() -> SyncConfig {
    match std::env::args().nth(1) {
        Some(path) => match SyncConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                report(&format!("{}; using defaults", err));
                SyncConfig::default()
            }
        },
        None => SyncConfig::default(),
    }
}

#[tokio::main]
async fn main() {
    let config = load_config();
    if let Some(dir) = &config.log_dir {
        if let Err(err) = rolling_logger::init_logger(dir, &config.app_name) {
            report(&format!("logging disabled: {}", err));
        }
    }

    let store = Arc::new(MemoryStore::<Task>::new(config.table.clone()));
    let session = match Session::open(store, &config).await {
        Ok(session) => session,
        Err(err) => {
            report(&format!("failed to open session: {}", err));
            std::process::exit(1);
        }
    };

    let _ = rolling_logger::info(&format!("session opened on {}", config.table));

    let mut filter = Filter::default();
    print_list(&session, filter).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                report(&format!("failed to read input: {}", err));
                break;
            }
        };
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(err) = run_command(&session, &config, &mut filter, command).await {
                    report(&err.to_string());
                }
            }
            Err(msg) => report(&msg),
        }
    }

    match session.close().await {
        Ok(()) => {
            let _ = rolling_logger::info("session closed");
        }
        Err(err) => report(&format!("failed to close session: {}", err)),
    }
}
