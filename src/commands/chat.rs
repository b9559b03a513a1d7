use anyhow::Context;
use clap::Args;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{parse_tag, print_sections, App};
use crate::markup::{parse_sections, segments, Section, SectionKind, Segment};
use crate::protocol::{MessageContext, SelectedDocument, TagSelection};
use crate::session::{ChatSession, DocumentView, SessionError, SessionUpdate};
use crate::store::ConversationStore;
use crate::stream::{AnalysisProgress, AnalysisStatus, TranscriptEntry};

#[derive(Args)]
pub struct ChatArgs {
    /// Conversation to join; a new one is created when omitted
    conversation: Option<String>,

    /// Title for a newly created conversation
    #[arg(long)]
    title: Option<String>,

    /// Restrict the corpus to a document, as ID or ID:FILENAME; repeatable
    #[arg(long = "document", value_parser = parse_document)]
    documents: Vec<SelectedDocument>,

    /// Restrict the corpus by tag, as key:value; repeatable
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<TagSelection>,

    /// Ask the assistant to show its reasoning
    #[arg(long)]
    reasoning: bool,
}

fn parse_document(raw: &str) -> Result<SelectedDocument, String> {
    let (id, filename) = raw.split_once(':').unwrap_or((raw, ""));
    let id = id
        .parse()
        .map_err(|_| format!("expected a numeric document id, got {:?}", id))?;
    Ok(SelectedDocument {
        id,
        filename: filename.to_string(),
    })
}

enum Input {
    Line(Option<String>),
    Update(Result<SessionUpdate, SessionError>),
}

/// Prints transcript entries once they stop changing.
#[derive(Default)]
struct Printer {
    printed: usize,
    progress: Option<(AnalysisStatus, usize, usize)>,
}

impl Printer {
    fn flush(&mut self, session: &mut ChatSession) {
        if session.transcript().len() < self.printed {
            // History replaced the transcript.
            self.printed = 0;
        }
        while let Some(entry) = session.transcript().get(self.printed).cloned() {
            if let TranscriptEntry::DocumentAnalysis(progress) = &entry {
                if !progress.closed {
                    self.report(progress);
                    return;
                }
            }
            self.print_entry(&entry, session);
            self.printed += 1;
        }
    }

    fn report(&mut self, progress: &AnalysisProgress) {
        let key = (progress.status, progress.completed, progress.total);
        if self.progress != Some(key) {
            println!(
                "  analysing documents: {}/{} ({}%)",
                progress.completed,
                progress.total,
                progress.progress_percent()
            );
            self.progress = Some(key);
        }
    }

    fn print_entry(&mut self, entry: &TranscriptEntry, session: &mut ChatSession) {
        match entry {
            TranscriptEntry::User(text) => println!("you> {}", text),
            TranscriptEntry::Assistant(text) if text.is_empty() => {}
            TranscriptEntry::Assistant(text) => {
                for section in parse_sections(text) {
                    print_section(&section, session);
                }
            }
            TranscriptEntry::DocumentAnalysis(progress) => {
                self.progress = None;
                println!(
                    "  analysed {}/{} documents ({:?})",
                    progress.completed, progress.total, progress.status
                );
                for document in &progress.documents {
                    println!(
                        "    {:>6}  {:?}  {}",
                        document.document_id, document.status, document.document_filename
                    );
                }
            }
        }
    }
}

fn print_section(section: &Section, session: &mut ChatSession) {
    let mut line = String::new();
    for segment in segments(&section.content, session.citations_mut()) {
        match segment {
            Segment::Text(text) => line.push_str(text),
            Segment::Citation { number, .. } => line.push_str(&format!("[{}]", number)),
        }
    }
    match section.kind {
        SectionKind::Text => println!("assistant> {}", line),
        kind => println!("  ({:?}) {}", kind, line.trim_end()),
    }
}

fn print_view(view: &DocumentView) {
    if let Some(focus) = &view.focus {
        println!(
            "[{}] {} ({})",
            focus.number, focus.record.document_filename, focus.record.document_date
        );
        if let Some(explanation) = &focus.record.explanation {
            println!("  {}", explanation);
        }
    } else {
        println!("{} ({})", view.document.document_filename, view.document.date);
    }
    println!();
    print_sections(&view.sections);
    if view.citations.len() > 1 {
        println!("{} citations reference this document", view.citations.len());
    }
}

async fn handle_command(
    command: &str,
    session: &mut ChatSession,
    app: &App,
) -> Result<(), SessionError> {
    let api = app.api();
    let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "open" => {
            let id = match arg.trim().parse::<usize>() {
                Ok(number) => session.citations().id_for_number(number).map(String::from),
                Err(_) => Some(arg.trim().to_string()),
            };
            let id = id.ok_or_else(|| SessionError::UnknownCitation(arg.trim().to_string()))?;
            let view = session.open_citation(&id, &api).await?;
            print_view(&view);
        }
        "doc" => {
            let view = session.open_document(arg.trim(), &api).await?;
            print_view(&view);
        }
        _ => println!("commands: /open N, /doc ID, /quit"),
    }
    Ok(())
}

pub async fn run(app: &App, args: ChatArgs) -> anyhow::Result<()> {
    let conversation_id = match args.conversation {
        Some(id) => id,
        None => {
            let conversation = app
                .api()
                .create(args.title.as_deref())
                .await
                .context("creating conversation")?;
            conversation.id
        }
    };

    let context = MessageContext {
        selected_documents: args.documents,
        selected_tags: args.tags,
        reasoning_mode: args.reasoning,
    };

    let mut session = ChatSession::new(app.config.clone(), app.credentials.clone(), app.auth.clone());
    session
        .switch_conversation(&conversation_id)
        .await
        .context("connecting")?;
    println!("conversation {} (type /quit to leave)", conversation_id);

    let mut printer = Printer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            update = session.next_update() => Input::Update(update),
        };

        match input {
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                let line = line.trim_end();
                if line == "/quit" {
                    break;
                }
                if let Some(command) = line.strip_prefix('/') {
                    if let Err(e) = handle_command(command, &mut session, app).await {
                        eprintln!("{}", e);
                    }
                    continue;
                }
                session.composer().set_draft(line);
                let text = session.composer().take();
                match session.send_message(&text, &context).await {
                    Ok(()) => printer.flush(&mut session),
                    Err(SessionError::EmptyMessage) => {}
                    Err(e) => eprintln!("{}", e),
                }
            }
            Input::Update(Ok(SessionUpdate::AuthExpired)) => {
                eprintln!("Your session expired. Sign in again and rerun with a fresh token.");
                break;
            }
            Input::Update(Ok(SessionUpdate::Disconnected)) => {
                eprintln!("Connection lost.");
                break;
            }
            Input::Update(Ok(SessionUpdate::Status(state))) => log::debug!("Connection {:?}", state),
            Input::Update(Ok(SessionUpdate::ConversationCreated(id))) => {
                log::info!("Server assigned conversation {}", id)
            }
            Input::Update(Ok(_)) => printer.flush(&mut session),
            Input::Update(Err(e)) => return Err(e.into()),
        }
        std::io::stdout().flush()?;
    }

    session.leave().await;
    Ok(())
}
