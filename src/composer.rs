use anyhow::{Context, Result};
use base64::Engine;
use iced::keyboard::{key::Named, Key, Modifiers};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::conversation::ContentPart;

/// Extensions offered by the file picker. A hint only; any file can be attached.
pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "txt", "md", "pdf", "csv",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Attachment {
            name: name.into(),
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

pub fn mime_type_for(path: &Path) -> String {
    if let Ok(format) = ImageFormat::from_path(path) {
        return format.to_mime_type().to_string();
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("txt") => "text/plain",
        Some("md") | Some("markdown") => "text/markdown",
        Some("pdf") => "application/pdf",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
    .to_string()
}

pub async fn read_attachment(path: PathBuf) -> Result<Attachment> {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let mime_type = mime_type_for(&path);

    debug!(%name, %mime_type, bytes = bytes.len(), "attachment read");
    Ok(Attachment::from_bytes(name, mime_type, &bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Submit,
    /// Let the editor handle the key, which is how Shift+Enter inserts a newline.
    Default,
}

pub fn key_action(key: &Key, modifiers: Modifiers) -> KeyAction {
    match key {
        Key::Named(Named::Enter) if !modifiers.shift() => KeyAction::Submit,
        _ => KeyAction::Default,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Composer {
    text: String,
    attachment: Option<Attachment>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, value: impl Into<String>) {
        self.text = value.into();
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.attachment = Some(attachment);
    }

    pub fn remove_attachment(&mut self) {
        self.attachment = None;
    }

    pub fn can_submit(&self, loading: bool) -> bool {
        !loading && (!self.text.trim().is_empty() || self.attachment.is_some())
    }

    /// Drains the pending input into request parts, attachment first.
    pub fn submit(&mut self, loading: bool) -> Option<Vec<ContentPart>> {
        if !self.can_submit(loading) {
            return None;
        }

        let mut parts = Vec::with_capacity(2);
        if let Some(file) = self.attachment.take() {
            parts.push(ContentPart::inline(file.mime_type, file.data));
        }
        let trimmed = self.text.trim();
        if !trimmed.is_empty() {
            parts.push(ContentPart::text(trimmed));
        }
        self.text.clear();

        Some(parts)
    }
}
