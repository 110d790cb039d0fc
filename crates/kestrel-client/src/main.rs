mod commands;

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kestrel_net::{HttpNetwork, NodeClientConfig};
use kestrel_sync::cipher::AesGcmCipher;
use kestrel_sync::{Engine, LoadOutcome, SyncConfig};
use kestrel_types::events::SyncEvent;
use kestrel_types::models::{ConversationKey, ConversationKind, PendingState};

use commands::Command;

/// How many of the newest messages are printed when a conversation changes.
const SHOWN_MESSAGES: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they don't interleave with the conversation view
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kestrel=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Config
    let sync_config = SyncConfig::from_env();
    let node_config = NodeClientConfig::from_env();
    let network = HttpNetwork::new(&node_config).context("invalid node configuration")?;
    info!(
        node = network.base_url(),
        device = ?sync_config.device_class,
        poll_ms = sync_config.poll_interval().as_millis() as u64,
        "starting"
    );

    let engine = Engine::new(sync_config, Arc::new(network), Arc::new(AesGcmCipher));

    if let Ok(account) = std::env::var("KESTREL_ACCOUNT") {
        let added = engine
            .login(account.as_str().into())
            .await
            .with_context(|| format!("login as {} failed", account))?;
        println!("{} conversations", added);
    } else {
        println!("not logged in, use /login <account>");
    }

    let shutdown = CancellationToken::new();
    let poller = engine.spawn_poller(shutdown.clone());
    let printer = tokio::spawn(print_events(engine.clone(), shutdown.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match commands::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = run(&engine, command).await {
                            println!("! {:#}", e);
                        }
                    }
                    Err(usage) => println!("{}", usage),
                }
            }
        }
    }

    shutdown.cancel();
    let _ = poller.await;
    let _ = printer.await;
    info!("bye");
    Ok(())
}

async fn run(engine: &Engine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login(account) => {
            let added = engine.login(account).await?;
            println!("{} conversations", added);
        }
        Command::List => {
            let conversations = engine.conversations().await;
            let profiles = engine.session().profiles().read().await;
            let selected = engine.session().selected_key();
            for (idx, conversation) in conversations.iter().enumerate() {
                let marker = if Some(conversation.key()) == selected { '*' } else { ' ' };
                let title = match conversation.kind {
                    ConversationKind::DirectMessage => profiles.display_name(&conversation.counterpart),
                    ConversationKind::GroupChat => format!("#{}", conversation.counterpart_group),
                };
                println!("{}{:>3}. {}", marker, idx + 1, title);
            }
        }
        Command::Open(n) => {
            let key = engine
                .conversations()
                .await
                .get(n - 1)
                .map(|c| c.key())
                .with_context(|| format!("no conversation {}", n))?;
            report_load(engine.select_conversation(key).await?);
        }
        Command::Dm(peer) => {
            let (_, outcome) = engine.start_conversation(peer).await?;
            report_load(outcome);
        }
        Command::Send(text) => {
            engine.send(&text).await?;
        }
        Command::Online(online) => engine.set_online(online),
        Command::Reload => {
            let added = engine.reload().await?;
            println!("{} new conversations", added);
        }
        Command::Switch(account) => {
            let added = engine.switch_account(account).await?;
            println!("{} conversations", added);
        }
        Command::Logout => engine.logout().await,
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn report_load(outcome: LoadOutcome) {
    if outcome == LoadOutcome::Superseded {
        println!("(switched away before the conversation loaded)");
    }
}

async fn print_events(engine: Engine, shutdown: CancellationToken) {
    let mut events = engine.subscribe();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(SyncEvent::SessionChanged { account: Some(account) }) => {
                println!("-- logged in as {}", account)
            }
            Ok(SyncEvent::SessionChanged { account: None }) => println!("-- logged out"),
            Ok(SyncEvent::DirectoryRefreshed { added, .. }) if added > 0 => {
                println!("-- {} new conversation(s), /list to see them", added)
            }
            Ok(SyncEvent::ConversationLoaded { key, .. })
            | Ok(SyncEvent::MessagesMerged { key, .. })
            | Ok(SyncEvent::SendCommitted { key, .. }) => print_conversation(&engine, &key).await,
            Ok(SyncEvent::SendRolledBack { error, .. }) => println!("! not sent: {}", error),
            Ok(SyncEvent::Notice { level, message }) => println!("[{:?}] {}", level, message),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn print_conversation(engine: &Engine, key: &ConversationKey) {
    if engine.session().selected_key().as_ref() != Some(key) {
        return;
    }
    let Some(conversation) = engine.conversation(key).await else {
        return;
    };
    let profiles = engine.session().profiles().read().await;

    println!("---- {}", key);
    for message in conversation.messages.iter().take(SHOWN_MESSAGES).rev() {
        let at = DateTime::from_timestamp_nanos(message.timestamp_nanos as i64).with_timezone(&Local);
        let who = if message.is_sender {
            "you".to_string()
        } else {
            profiles.display_name(&message.sender)
        };
        let state = match message.pending.map(|p| p.state) {
            Some(PendingState::InFlight) => " (sending)",
            Some(PendingState::Sent) => " (sent)",
            None => "",
        };
        println!("{} {}: {}{}", at.format("%H:%M"), who, message.body, state);
    }
}
