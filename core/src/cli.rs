/// Terminal inbox client
///
/// Line-oriented command loop over the inbox service. Commands:
///   chats                 list conversations
///   open <peer-id>        select a conversation and show its thread
///   back                  deselect
///   send <text>           send to the selected peer over the live channel
///   contact <peer> <text> first-contact send through the REST endpoint
///   quit                  close the channel and exit
use crate::aggregator::{ConversationSummary, ThreadMessage};
use crate::channel::ChannelState;
use crate::error::{ChatError, Result};
use crate::inbox::{Inbox, InboxEvent};
use colored::*;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const FLAGS_WITH_VALUE: &[&str] = &["--api-url", "--ws-url", "--http-timeout"];

/// Extract the positional login credentials: `inbox <token> <user-id> <username>`
pub fn parse_login(args: &[String]) -> Result<(String, u64, String)> {
    let mut positional = Vec::new();
    let mut i = 1;
    while i < args.len() {
        if FLAGS_WITH_VALUE.contains(&args[i].as_str()) {
            i += 2;
        } else {
            positional.push(args[i].clone());
            i += 1;
        }
    }

    if positional.len() < 3 {
        return Err(ChatError::Config(format!(
            "Usage: {} <token> <user-id> <username> [--api-url URL] [--ws-url URL] [--http-timeout SECS]",
            args.first().map(|s| s.as_str()).unwrap_or("inbox")
        )));
    }

    let token = positional[0].clone();
    let user_id = positional[1]
        .parse::<u64>()
        .map_err(|_| ChatError::Config("user id must be a number".to_string()))?;
    let username = positional[2].clone();
    Ok((token, user_id, username))
}

/// Interactive command loop. Returns when the user quits or stdin closes.
pub async fn run(inbox: Inbox) -> anyhow::Result<()> {
    // Background printer for pushed messages and channel state changes
    let local_user = inbox.session().local_user().await.unwrap_or(0);
    let mut events = inbox.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Slow terminal; skip the missed events and keep printing
                    tracing::warn!("Event printer lagged {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                InboxEvent::MessageIngested { message } => {
                    if message.sender != local_user {
                        println!(
                            "\n{} {}: {}",
                            "[new]".green().bold(),
                            message.sender_name.bold(),
                            message.text
                        );
                    }
                }
                InboxEvent::ChannelState { state } => match state {
                    ChannelState::Open => println!("{}", "[channel open]".green()),
                    ChannelState::Error => println!("{}", "[channel error]".red()),
                    ChannelState::Disconnected => println!("{}", "[channel disconnected]".yellow()),
                    _ => {}
                },
                InboxEvent::HistoryLoaded { count } => {
                    println!("{}", format!("[history loaded: {} messages]", count).dimmed());
                }
            }
        }
    });

    println!("{}", "Unimarket inbox - type 'help' for commands".bold());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "help" => print_help(),
            "chats" => match inbox.conversations().await {
                Ok(list) => render_conversations(&list),
                Err(e) => eprintln!("{} {}", "✗".red().bold(), e),
            },
            "open" => {
                let peer = match rest.trim().parse::<u64>() {
                    Ok(peer) => peer,
                    Err(_) => {
                        eprintln!("{}", "Usage: open <peer-id>".yellow());
                        continue;
                    }
                };
                inbox.select(Some(peer)).await;
                match inbox.thread().await {
                    Ok(Some(thread)) => render_thread(&thread),
                    Ok(None) => {}
                    Err(e) => eprintln!("{} {}", "✗".red().bold(), e),
                }
            }
            "back" => inbox.select(None).await,
            "send" => {
                if let Err(e) = inbox.send(rest).await {
                    eprintln!("{} {}", "✗".red().bold(), e);
                }
            }
            "contact" => {
                let (peer, text) = match rest.split_once(' ') {
                    Some((peer, text)) => (peer, text),
                    None => {
                        eprintln!("{}", "Usage: contact <peer-id> <message>".yellow());
                        continue;
                    }
                };
                let peer = match peer.parse::<u64>() {
                    Ok(peer) => peer,
                    Err(_) => {
                        eprintln!("{}", "peer id must be a number".yellow());
                        continue;
                    }
                };
                match inbox.contact(peer, text).await {
                    Ok(message) => println!("{} message {} stored", "✓".green().bold(), message.id),
                    Err(e) => eprintln!("{} {}", "✗".red().bold(), e),
                }
            }
            "quit" | "exit" => break,
            other => {
                eprintln!("{} Unknown command: {}", "✗".red().bold(), other.red());
                print_help();
            }
        }
    }

    inbox.shutdown().await;
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  chats                 list conversations, newest first");
    println!("  open <peer-id>        show one conversation");
    println!("  back                  leave the conversation");
    println!("  send <text>           send to the open conversation");
    println!("  contact <peer> <text> first-contact send via the REST API");
    println!("  quit                  close the channel and exit");
}

fn render_conversations(list: &[ConversationSummary]) {
    if list.is_empty() {
        println!("{}", "No conversations yet".dimmed());
        return;
    }
    for conversation in list {
        println!(
            "{:>6}  {}  {}  {}",
            conversation.peer_id.to_string().cyan(),
            conversation.peer_name.bold(),
            conversation.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            conversation.preview
        );
    }
}

fn render_thread(thread: &[ThreadMessage]) {
    if thread.is_empty() {
        println!("{}", "No messages in this conversation yet".dimmed());
        return;
    }
    for entry in thread {
        let time = entry.message.timestamp.format("%H:%M").to_string();
        if entry.is_sender {
            println!("{} {} {}", time.dimmed(), "you:".green(), entry.message.text);
        } else {
            println!(
                "{} {} {}",
                time.dimmed(),
                format!("{}:", entry.message.sender_name).blue(),
                entry.message.text
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_login_skips_flags() {
        let (token, user_id, username) = parse_login(&args(&[
            "inbox",
            "--ws-url",
            "ws://localhost:9000",
            "sekrit",
            "42",
            "alice",
        ]))
        .unwrap();
        assert_eq!(token, "sekrit");
        assert_eq!(user_id, 42);
        assert_eq!(username, "alice");
    }

    #[test]
    fn test_parse_login_requires_all_positionals() {
        assert!(parse_login(&args(&["inbox", "sekrit", "42"])).is_err());
        assert!(parse_login(&args(&["inbox", "sekrit", "notanumber", "alice"])).is_err());
    }
}
