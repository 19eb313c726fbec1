use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Base64 payload with its declared mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One piece of a turn. Serializes to the generateContent part shape,
/// `{"text": ..}` or `{"inlineData": {"mimeType": .., "data": ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentPart {
    Text(String),
    InlineData(InlineData),
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        ContentPart::Text(value.into())
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentPart::InlineData(InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    id: String,
    role: Role,
    parts: Vec<ContentPart>,
}

impl Turn {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }
}

/// Append-only transcript, oldest turn first.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Appends a turn with a fresh id. Empty `parts` are refused.
    pub fn append(&mut self, role: Role, parts: Vec<ContentPart>) -> Option<&Turn> {
        if parts.is_empty() {
            return None;
        }
        self.turns.push(Turn {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
        });
        self.turns.last()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
