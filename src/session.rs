use tracing::{debug, warn};

use crate::conversation::{ContentPart, Conversation, Role, Turn};
use crate::gemini::Reply;

/// Everything needed to issue the request for a freshly appended user turn.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub history: Vec<Turn>,
    pub parts: Vec<ContentPart>,
}

/// Transcript plus the single in-flight request slot.
#[derive(Debug, Default)]
pub struct Session {
    conversation: Conversation,
    loading: bool,
    banner: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn show_banner(&mut self, message: impl Into<String>) {
        self.banner = Some(message.into());
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Appends the user turn and claims the request slot.
    pub fn submit(&mut self, parts: Vec<ContentPart>) -> Option<Exchange> {
        if self.loading || parts.is_empty() {
            return None;
        }

        self.banner = None;
        let history = self.conversation.turns().to_vec();
        self.conversation.append(Role::User, parts.clone())?;
        self.loading = true;

        debug!(history = history.len(), parts = parts.len(), "user turn appended");
        Some(Exchange { history, parts })
    }

    /// Records the model turn for the in-flight request and frees the slot.
    pub fn settle(&mut self, reply: Reply) {
        if !self.loading {
            warn!("reply received with no request in flight, dropping it");
            return;
        }

        if let Some(message) = reply.failure() {
            self.banner = Some(message.to_string());
        }
        self.conversation
            .append(Role::Model, vec![ContentPart::text(reply.text())]);
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::tests::ScriptedBackend;
    use crate::gemini::Responder;
    use std::sync::Arc;

    async fn round_trip(session: &mut Session, responder: &Responder, parts: Vec<ContentPart>) -> bool {
        let Some(exchange) = session.submit(parts) else {
            return false;
        };
        let reply = responder.generate(exchange.history, exchange.parts).await;
        session.settle(reply);
        true
    }

    #[tokio::test]
    async fn test_hello_scenario() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("hi there".to_string())]));
        let responder = Responder::new("m", backend.clone());
        let mut session = Session::new();

        assert!(round_trip(&mut session, &responder, vec![ContentPart::text("hello")]).await);

        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[0].parts(), &[ContentPart::text("hello")]);
        assert_eq!(turns[1].role(), Role::Model);
        assert_eq!(turns[1].parts(), &[ContentPart::text("hi there")]);
        assert!(!session.is_loading());
        assert_eq!(session.banner(), None);

        let request = backend.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].parts, vec![ContentPart::text("hello")]);
    }

    #[tokio::test]
    async fn test_failure_adds_error_turn_and_banner() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err("quota exceeded".to_string()),
            Ok("better now".to_string()),
        ]));
        let responder = Responder::new("m", backend);
        let mut session = Session::new();

        round_trip(&mut session, &responder, vec![ContentPart::text("hi")]).await;
        let turns = session.conversation().turns();
        assert_eq!(turns[1].parts(), &[ContentPart::text("Error: quota exceeded")]);
        assert_eq!(session.banner(), Some("quota exceeded"));
        assert!(!session.is_loading());

        round_trip(&mut session, &responder, vec![ContentPart::text("again")]).await;
        assert_eq!(session.conversation().len(), 4);
        assert_eq!(session.banner(), None);
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_noop() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("first".to_string())]));
        let responder = Responder::new("m", backend);
        let mut session = Session::new();

        let exchange = session.submit(vec![ContentPart::text("one")]).unwrap();
        assert!(session.is_loading());
        assert!(session.submit(vec![ContentPart::text("two")]).is_none());
        assert_eq!(session.conversation().len(), 1);

        session.settle(responder.generate(exchange.history, exchange.parts).await);
        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.conversation().turns()[0].parts(), &[ContentPart::text("one")]);
    }

    #[test]
    fn test_history_excludes_new_turn() {
        let mut session = Session::new();
        let first = session.submit(vec![ContentPart::text("a")]).unwrap();
        assert!(first.history.is_empty());
        session.settle(Reply::Text("b".to_string()));

        let second = session.submit(vec![ContentPart::text("c")]).unwrap();
        assert_eq!(second.history.len(), 2);
        assert_eq!(session.conversation().len(), 3);
    }

    #[test]
    fn test_rejected_submits_do_not_grow_conversation() {
        let mut session = Session::new();
        assert!(session.submit(Vec::new()).is_none());
        assert!(session.conversation().is_empty());
        assert!(!session.is_loading());
    }

    #[test]
    fn test_stray_settle_is_ignored() {
        let mut session = Session::new();
        session.settle(Reply::Text("unexpected".to_string()));
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn test_dismiss_banner() {
        let mut session = Session::new();
        session.submit(vec![ContentPart::text("x")]);
        session.settle(Reply::Failed("boom".to_string()));
        assert_eq!(session.banner(), Some("boom"));
        session.dismiss_banner();
        assert_eq!(session.banner(), None);
    }
}
