use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use smartmark::command::{self, Command};
use smartmark::config::{Cli, Config, default_config_dir, default_config_path};
use smartmark::db::Database;
use smartmark::display::format_row;
use smartmark::feed::ChangeFeed;
use smartmark::poller::ChangePoller;
use smartmark::session::{Session, SessionView};
use smartmark::unpack_error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // With --config the database lives next to the config file, otherwise
    // both go under ~/.smartmark/
    let (config_path, data_dir) = match &args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("smartmark starting");

    let cfg = Config::load(&config_path, args.config_path.is_some()).unwrap_or_else(|e| {
        tracing::error!(error = %format!("{e:#}"), path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });

    let identity = cfg.identity(&args).unwrap_or_else(|e| {
        tracing::error!(error = %e, "no session identity");
        std::process::exit(1);
    });

    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    let feed = ChangeFeed::new(cfg.app.feed_capacity);
    let store = Arc::new(db.for_user(&identity, feed.clone()));
    let cancellation_token = CancellationToken::new();

    let poller = ChangePoller::new(
        store.clone(),
        feed.clone(),
        &identity.user_id,
        Duration::from_secs(cfg.app.poll_interval_seconds.max(1)),
    );
    let poller_task = tokio::spawn(poller.run(cancellation_token.child_token()));

    let session = Session::start(identity.clone(), store, &feed)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %unpack_error(&e), "failed to load bookmarks");
            std::process::exit(1);
        });

    println!("signed in as {}", display_name(&identity.email, &identity.user_id));
    println!("{}", command::HELP);
    render(&session.view());

    let session = Arc::new(session);
    let mut updates = session.subscribe();
    let mut shown = updates.borrow_and_update().bookmarks.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut commands = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::List) => render(&session.view()),
                    Ok(Command::Help) => println!("{}", command::HELP),
                    Ok(command) => {
                        let session = session.clone();
                        commands.spawn(async move { command::execute(&session, command).await });
                    }
                    Err(msg) => println!("{msg}"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read input");
                    break;
                }
            },
            Some(done) = commands.join_next(), if !commands.is_empty() => match done {
                Ok(Some(message)) => println!("{message}"),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "command task failed"),
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = updates.borrow_and_update().clone();
                if view.bookmarks != shown {
                    render(&view);
                    shown = view.bookmarks;
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("ctrl+c signal received, preparing to shutdown");
                break;
            }
        }
    }

    commands.shutdown().await;
    cancellation_token.cancel();
    if let Ok(session) = Arc::try_unwrap(session) {
        session.shutdown().await;
    }
    if let Err(e) = poller_task.await {
        tracing::error!(error = %e, "change poller failed");
    }
    tracing::info!("smartmark going off, graceful shutdown complete");
}

fn render(view: &SessionView) {
    if view.bookmarks.is_empty() {
        println!("\nNo bookmarks yet. Add your first one with: add <url> <title>\n");
        return;
    }

    let now = Utc::now();
    println!();
    for (i, bookmark) in view.bookmarks.iter().enumerate() {
        println!("{}", format_row(i + 1, bookmark, now));
    }
    println!();
}

fn display_name<'a>(email: &'a str, user_id: &'a str) -> &'a str {
    if email.is_empty() { user_id } else { email }
}
