use clap::Subcommand;

use super::{parse_tag, print_sections, App};
use crate::highlight::mark_sections;
use crate::protocol::TagSelection;
use crate::store::DocumentStore;

#[derive(Subcommand)]
pub enum DocumentCommand {
    /// List documents, optionally filtered by tags
    List {
        /// Tag filter as key:value; repeatable
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<TagSelection>,
    },
    /// List the tag keys in use
    Tags,
    /// Print a document, marking a quote if given
    Show {
        id: String,
        #[arg(long)]
        quote: Option<String>,
    },
}

pub async fn run(app: &App, command: DocumentCommand) -> anyhow::Result<()> {
    let api = app.api();
    match command {
        DocumentCommand::List { tags } => {
            for document in api.list_documents(&tags).await? {
                let tags: Vec<String> = document
                    .tags
                    .iter()
                    .flat_map(|tag| tag.iter().map(|(k, v)| format!("{}:{}", k, v)))
                    .collect();
                println!("{:>6}  {}  [{}]", document.id, document.filename, tags.join(", "));
            }
        }
        DocumentCommand::Tags => {
            for tag in api.available_tags().await? {
                println!("{}", tag);
            }
        }
        DocumentCommand::Show { id, quote } => {
            let document = api.get_by_id(&id).await?;
            println!("{} ({})\n", document.document_filename, document.date);
            let sections = mark_sections(&document.content, quote.as_deref());
            if quote.is_some()
                && !sections
                    .iter()
                    .flat_map(|section| &section.paragraphs)
                    .any(|paragraph| paragraph.mark.is_some())
            {
                log::warn!("Quote not found in document {}", id);
            }
            print_sections(&sections);
        }
    }
    Ok(())
}
