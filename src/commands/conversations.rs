use clap::Subcommand;

use super::App;
use crate::store::ConversationStore;

#[derive(Subcommand)]
pub enum ConversationCommand {
    /// List conversations
    List,
    /// Create a conversation
    New {
        #[arg(long)]
        title: Option<String>,
    },
    /// Rename a conversation
    Rename { id: String, title: String },
    /// Delete a conversation
    Delete { id: String },
}

pub async fn run(app: &App, command: ConversationCommand) -> anyhow::Result<()> {
    let api = app.api();
    match command {
        ConversationCommand::List => {
            for conversation in api.list().await? {
                println!(
                    "{:>6}  {}  {}",
                    conversation.id,
                    conversation.updated_at.as_deref().unwrap_or("-"),
                    conversation.title
                );
            }
        }
        ConversationCommand::New { title } => {
            let conversation = api.create(title.as_deref()).await?;
            println!("{}", conversation.id);
        }
        ConversationCommand::Rename { id, title } => {
            let conversation = api.update_title(&id, &title).await?;
            println!("{}  {}", conversation.id, conversation.title);
        }
        ConversationCommand::Delete { id } => {
            api.delete(&id).await?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}
