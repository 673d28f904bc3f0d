//! Conversation state shared by the agents
//!
//! Messages are immutable once appended. The only rewrite that ever happens is
//! [`Message::handoff`], applied by an agent node to its own freshly produced
//! trailing message before it is merged.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Provider-facing message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// Tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Structured content block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String },
}

/// Message content: plain text or a list of blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Flatten to text. Image blocks contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

/// A single conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Author tag (`researcher`, `chart_generator`), set on agent handoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            name: None,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<Content>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(content: impl Into<Content>, tool_call_id: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Set the author tag.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Text content with block content flattened.
    pub fn text(&self) -> String {
        self.content.text()
    }

    /// Author tag, falling back to the role name.
    pub fn author(&self) -> &str {
        self.name.as_deref().unwrap_or(self.role.as_str())
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Attribute a freshly produced reply to `agent`.
    ///
    /// The message becomes a user turn named after the agent, since some
    /// providers reject a conversation whose last turn is the assistant's.
    /// Id and content are kept.
    pub fn handoff(self, agent: &str) -> Self {
        Self {
            id: self.id,
            role: Role::User,
            name: Some(agent.to_string()),
            content: self.content,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Ordered, append-only message history
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        let mut state = Self::new();
        state.merge(messages);
        state
    }

    /// State holding a single user message.
    pub fn from_user_input(input: &str) -> Self {
        Self::with_messages(vec![Message::user(input)])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Append one message unless its id is already present.
    pub fn push(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Append messages in order, skipping ids already present.
    ///
    /// Returns how many were appended.
    pub fn merge(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        let mut seen: HashSet<String> = self.messages.iter().map(|m| m.id.clone()).collect();
        let before = self.messages.len();
        for message in messages {
            if seen.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.messages.len() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_unique() {
        let a = Message::user("hi");
        let b = Message::user("hi");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_block_content_flattens_text_only() {
        let message = Message::assistant(Content::Blocks(vec![
            ContentBlock::Text { text: "UK GDP".to_string() },
            ContentBlock::Image { url: "file://chart.png".to_string() },
            ContentBlock::Text { text: "2019-2023".to_string() },
        ]));

        assert_eq!(message.text(), "UK GDP\n2019-2023");
    }

    #[test]
    fn test_content_untagged_serde() {
        let text: Content = serde_json::from_str(r#""plain""#).unwrap();
        assert_eq!(text, Content::Text("plain".to_string()));

        let blocks: Content =
            serde_json::from_str(r#"[{"type": "text", "text": "a"}]"#).unwrap();
        assert_eq!(blocks.text(), "a");
    }

    #[test]
    fn test_handoff_relabels_and_keeps_id() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "tavily_search".to_string(),
            arguments: serde_json::json!({}),
        };
        let reply = Message::assistant_with_tool_calls("done", vec![call]);
        let id = reply.id.clone();

        let relabeled = reply.handoff("researcher");

        assert_eq!(relabeled.id, id);
        assert_eq!(relabeled.role, Role::User);
        assert_eq!(relabeled.author(), "researcher");
        assert_eq!(relabeled.text(), "done");
        assert!(!relabeled.has_tool_calls());
    }

    #[test]
    fn test_author_falls_back_to_role() {
        assert_eq!(Message::user("q").author(), "user");
        assert_eq!(Message::tool("r", "call_1").author(), "tool");
    }

    #[test]
    fn test_merge_is_append_only_and_skips_duplicates() {
        let first = Message::user("question");
        let mut state = ConversationState::with_messages(vec![first.clone()]);

        let reply = Message::assistant("answer");
        let appended = state.merge(vec![first.clone(), reply.clone(), reply.clone()]);

        assert_eq!(appended, 1);
        assert_eq!(state.len(), 2);
        assert_eq!(state.messages()[0], first);
        assert_eq!(state.last(), Some(&reply));
    }

    #[test]
    fn test_push_rejects_duplicate_id() {
        let message = Message::user("q");
        let mut state = ConversationState::new();
        assert!(state.push(message.clone()));
        assert!(!state.push(message));
        assert_eq!(state.len(), 1);
    }
}
