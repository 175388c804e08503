use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use base64::Engine;
use pkpchat_api::GenerationProvider;
use pkpchat_chat::extract_document;
use pkpchat_storage::KeyValueStore;
use pkpchat_types::{Attachment, ChatMode, MessageBody, MIN_DOCUMENT_LEN};

use crate::export;

use super::{format_session_list, session_at_index, App};

/// Run the interactive loop. Exactly one turn is in flight at a time; the
/// session-long Ctrl-C handler cancels whichever turn currently owns the
/// shared token slot.
pub async fn run_repl<P: GenerationProvider, S: KeyValueStore>(
    mut app: App<P, S>,
) -> Result<()> {
    println!("{}", "💬 PKP Chat".bright_cyan().bold());
    println!(
        "{}",
        "Chat with web-grounded answers, generate images, or build slide decks.".bright_black()
    );
    println!(
        "{}",
        "Type '/help' for commands, 'exit' to quit. Ctrl-C interrupts a running turn.\n"
            .bright_black()
    );

    // Holds the cancellation token of the turn currently in flight
    let current_token: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));
    let handler_token = current_token.clone();

    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_ok() {
                if let Ok(guard) = handler_token.lock() {
                    if let Some(token) = guard.as_ref() {
                        println!("\n{}", "^C - Interrupting...".bright_yellow());
                        token.cancel();
                    }
                }
            }
        }
    });

    let mut rl = DefaultEditor::new()?;

    // An image staged with /attach rides along with the next prompt
    let mut staged_attachment: Option<Attachment> = None;

    loop {
        let mode_indicator = format!("[{}]", app.selected_mode.as_str()).bright_magenta();
        let readline = rl.readline(&format!("{} {} ", mode_indicator, "You:".bright_green().bold()));

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line == "exit" || line == "quit" {
                    break;
                }

                if let Some(command) = line.strip_prefix('/') {
                    if let Some(path) = command.strip_prefix("attach ") {
                        match load_attachment(path.trim()) {
                            Ok(attachment) => {
                                println!(
                                    "Attached {} ({})",
                                    path.trim().green(),
                                    attachment.mime_type
                                );
                                staged_attachment = Some(attachment);
                            }
                            Err(e) => eprintln!("{} {}", "⚠️".yellow(), e),
                        }
                    } else {
                        handle_command(&mut app, command);
                    }
                    continue;
                }

                let token = CancellationToken::new();
                if let Ok(mut guard) = current_token.lock() {
                    *guard = Some(token.clone());
                }

                let result = app.run_turn(line, staged_attachment.take(), &token).await;

                if let Ok(mut guard) = current_token.lock() {
                    *guard = None;
                }
                if let Err(e) = result {
                    eprintln!("{} {}", "⚠️".yellow(), e);
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    app.persist();
    Ok(())
}

fn handle_command<P: GenerationProvider, S: KeyValueStore>(app: &mut App<P, S>, command: &str) {
    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim);

    match name {
        "new" => {
            app.new_session();
            println!("{}", "Started a new chat".green());
        }
        "sessions" => {
            for line in format_session_list(&app.sessions, app.active) {
                println!("{}", line);
            }
        }
        "switch" => match arg.and_then(|a| a.parse::<usize>().ok()) {
            Some(index) => match session_at_index(&app.sessions, index) {
                Some(id) => {
                    app.active = id;
                    app.persist();
                    show_transcript_tail(app, id);
                }
                None => eprintln!("{} No session at index {}", "⚠️".yellow(), index),
            },
            None => eprintln!("{} Usage: /switch <number>", "⚠️".yellow()),
        },
        "delete" => {
            let active = app.active;
            if app.delete_session(active) {
                println!("{}", "Deleted the active chat".green());
            }
        }
        "mode" => match arg.and_then(ChatMode::from_str) {
            Some(mode) => {
                app.selected_mode = mode;
                println!("Mode set to {}", mode.as_str().bright_magenta());
            }
            None => eprintln!("{} Usage: /mode text|image|presentation", "⚠️".yellow()),
        },
        "attach" => eprintln!("{} Usage: /attach <path>", "⚠️".yellow()),
        "export" => handle_export(app, arg),
        "help" => {
            println!("  /new                  start a new chat");
            println!("  /sessions             list saved chats");
            println!("  /switch <number>      make a listed chat active");
            println!("  /delete               delete the active chat");
            println!("  /mode <m>             select text, image or presentation mode");
            println!("  /attach <path>        send an image with the next prompt");
            println!("  /export [path]        save the latest deck or image");
            println!("  exit                  quit");
        }
        _ => eprintln!("{} Unknown command: /{}", "⚠️".yellow(), name),
    }
}

/// Save the most recent exportable artifact of the active session: a
/// presentation document or a generated image.
fn handle_export<P: GenerationProvider, S: KeyValueStore>(app: &App<P, S>, arg: Option<&str>) {
    let Some(session) = app.active_session() else {
        eprintln!("{} No active session", "⚠️".yellow());
        return;
    };

    for message in session.messages.iter().rev() {
        match &message.body {
            MessageBody::Image { data_uri } => {
                let stem = Path::new(arg.unwrap_or("pkpchat-image"));
                match export::write_image(data_uri, stem) {
                    Ok(path) => println!("Saved image to {}", path.display().to_string().green()),
                    Err(e) => eprintln!("{} {}", "⚠️".yellow(), e),
                }
                return;
            }
            MessageBody::Text { content, mode: ChatMode::Presentation, .. } => {
                let document = extract_document(content);
                if document.len() > MIN_DOCUMENT_LEN {
                    let path = Path::new(arg.unwrap_or("presentation.html"));
                    match export::write_presentation(&document, path) {
                        Ok(path) => {
                            println!("Saved presentation to {}", path.display().to_string().green())
                        }
                        Err(e) => eprintln!("{} {}", "⚠️".yellow(), e),
                    }
                    return;
                }
            }
            _ => {}
        }
    }

    println!("{}", "Nothing exportable in this chat yet".bright_black());
}

/// Read an image file and stage it as a base64 attachment.
fn load_attachment(path: &str) -> Result<Attachment> {
    let mime_type = match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => anyhow::bail!("Unsupported attachment type (png, jpg, webp or gif)"),
    };

    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;

    Ok(Attachment {
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
        mime_type: mime_type.to_string(),
    })
}

fn show_transcript_tail<P: GenerationProvider, S: KeyValueStore>(app: &App<P, S>, id: Uuid) {
    let Some(session) = app.sessions.iter().find(|s| s.id == id) else {
        return;
    };
    println!("{}", format!("── {} ──", session.title).bright_black());
    for message in session.messages.iter().rev().take(4).rev() {
        let speaker = match message.role {
            pkpchat_types::Role::User => "You".bright_green(),
            pkpchat_types::Role::Assistant => "AI".bright_cyan(),
        };
        let preview = match &message.body {
            MessageBody::Text { content, .. } => pkpchat_logging::safe_truncate(content, 120),
            MessageBody::Image { .. } => "[image]".to_string(),
            MessageBody::Error { message } => format!("[error] {}", message),
        };
        println!("{}: {}", speaker, preview);
    }
}
