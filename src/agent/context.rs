//! Opening messages of a conversation

use crate::host::{DocumentSurface, document_context};
use crate::llm::ConversationMessage;

/// Standing instructions for both operating modes
pub const INSTRUCTIONS: &str = "You are Fairy, a voice assistant inside a code editor. \
The user speaks instructions about the open file. The file is shown with a line number \
before every line; line numbers in tool arguments use the same 1-based numbering. \
Act through the provided tools. Use Response to tell the user something. \
When an edit needs more than a single line, call ModifyCode with a short description \
of the change instead of writing the code yourself.";

/// System instructions, the document context and the spoken request
pub async fn opening_messages(
    host: &dyn DocumentSurface,
    transcript: &str,
) -> Vec<ConversationMessage> {
    vec![
        ConversationMessage::system(INSTRUCTIONS),
        ConversationMessage::user(document_context(host).await),
        ConversationMessage::user(transcript),
    ]
}

/// Instructions for a streaming session, including the document
pub async fn streaming_instructions(host: &dyn DocumentSurface) -> String {
    format!("{INSTRUCTIONS}\n\n{}", document_context(host).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BufferDocument;
    use crate::llm::Role;

    #[tokio::test]
    async fn opening_messages_carry_numbered_document() {
        let doc = BufferDocument::in_memory("file:///a.rs", "let a = 1;\nlet b = 2;");
        let messages = opening_messages(&doc, "save the file").await;

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].text, "file:///a.rs:\n1 let a = 1;\n2 let b = 2;");
        assert_eq!(messages[2].text, "save the file");
    }
}
