//! One user turn: mode detection, context build, provider call, stream
//! aggregation, finalization, and persistence.

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;

use pkpchat_api::{GenerationProvider, ProviderError};
use pkpchat_chat::{
    build_context, detect_mode, extract_document, find_preserve_target, session,
    drive_stream, TurnAggregator, TurnOutcome, GENERIC_FAILURE_TEXT,
};
use pkpchat_storage::KeyValueStore;
use pkpchat_types::{
    Attachment, ChatMode, Message, MessageBody, DEFAULT_SESSION_TITLE, MIN_DOCUMENT_LEN,
};

use super::App;

impl<P: GenerationProvider, S: KeyValueStore> App<P, S> {
    /// Run one user turn against the active session. The cancellation token
    /// belongs to this turn only; triggering it stops fragment consumption
    /// at the next suspension point and discards the partial message.
    pub async fn run_turn(
        &mut self,
        prompt: &str,
        attachment: Option<Attachment>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mode = detect_mode(self.selected_mode, prompt);
        let is_first_exchange = self
            .active_session()
            .map(|s| s.messages.is_empty())
            .unwrap_or(false);

        {
            let session = session::find_session_mut(&mut self.sessions, self.active)
                .context("No active session")?;
            let mut user = Message::user_text(prompt, mode);
            if let Some(att) = attachment.clone() {
                user = user.with_attachment(att);
            }
            session.messages.push(user);
        }
        self.persist();

        let completed = match mode {
            ChatMode::Image => self.run_image_turn(prompt, attachment.as_ref(), cancel).await,
            _ => {
                self.run_stream_turn(prompt, attachment.as_ref(), mode, cancel)
                    .await
            }
        };

        // Best-effort title once the first exchange actually produced something
        if is_first_exchange && completed {
            let needs_title = self
                .active_session()
                .map(|s| s.title == DEFAULT_SESSION_TITLE)
                .unwrap_or(false);
            if needs_title {
                let title = self.provider.generate_title(prompt).await;
                if let Some(session) = session::find_session_mut(&mut self.sessions, self.active)
                {
                    session.title = title;
                }
            }
        }

        self.persist();
        Ok(())
    }

    /// Streaming chat or presentation turn. Returns true when an assistant
    /// message (including an error one) was appended.
    async fn run_stream_turn(
        &mut self,
        prompt: &str,
        attachment: Option<&Attachment>,
        mode: ChatMode,
        cancel: &CancellationToken,
    ) -> bool {
        let contents = {
            let Some(session) = self.active_session() else {
                return false;
            };
            // The just-appended user message is carried by `prompt`, not history
            let history = &session.messages[..session.messages.len() - 1];
            let preserve = find_preserve_target(history);
            build_context(history, prompt, attachment, preserve)
        };

        let stream = match mode {
            ChatMode::Presentation => self.provider.generate_presentation_stream(contents).await,
            _ => self.provider.generate_content_stream(contents).await,
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("{} Failed to start generation: {}", "⚠️".yellow(), e);
                self.append_assistant(Message::assistant_error(GENERIC_FAILURE_TEXT));
                return true;
            }
        };

        let aggregator = TurnAggregator::new(mode);
        let in_progress_id = aggregator.message().id;
        self.append_assistant(aggregator.message().clone());

        let sessions = &mut self.sessions;
        let active = self.active;
        let mut printed = 0usize;

        let outcome = drive_stream(aggregator, stream, cancel, |message| {
            let content = message.text_content();
            if content.len() > printed {
                print!("{}", &content[printed..]);
                let _ = io::stdout().flush();
                printed = content.len();
            }
            if let Some(session) = session::find_session_mut(sessions, active) {
                session::replace_message(session, message);
            }
        })
        .await;
        println!();

        // Cleanup runs whichever way the loop ended
        match outcome {
            TurnOutcome::Completed(message) => {
                if let Some(session) = session::find_session_mut(&mut self.sessions, active) {
                    session::replace_message(session, &message);
                }
                self.report_completed(&message, mode);
                true
            }
            TurnOutcome::Failed { message, detail } => {
                eprintln!("{} Generation failed: {}", "⚠️".yellow(), detail);
                if let Some(session) = session::find_session_mut(&mut self.sessions, active) {
                    session::replace_message(session, &message);
                }
                true
            }
            TurnOutcome::Cancelled => {
                if let Some(session) = session::find_session_mut(&mut self.sessions, active) {
                    session::discard_message(session, in_progress_id);
                }
                println!("{}", "🚫 Generation cancelled".yellow());
                false
            }
        }
    }

    /// Single-shot image turn.
    async fn run_image_turn(
        &mut self,
        prompt: &str,
        attachment: Option<&Attachment>,
        cancel: &CancellationToken,
    ) -> bool {
        println!("{}", "🎨 Generating image...".bright_black());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.provider.generate_image(prompt, attachment) => Some(result),
        };

        let message = match result {
            None => {
                println!("{}", "🚫 Image generation cancelled".yellow());
                return false;
            }
            Some(Ok(data_uri)) => {
                println!("{}", "🖼  Image generated - use /export to save it".green());
                Message::assistant_image(data_uri)
            }
            Some(Err(e @ ProviderError::SafetyRejected(_))) => {
                // Shown verbatim, not collapsed into the generic failure text
                Message::assistant_error(e.to_string())
            }
            Some(Err(e)) => {
                eprintln!("{} Image generation failed: {}", "⚠️".yellow(), e);
                Message::assistant_error(GENERIC_FAILURE_TEXT)
            }
        };

        if let MessageBody::Error { message } = &message.body {
            println!("{}", message.red());
        }
        self.append_assistant(message);
        true
    }

    fn append_assistant(&mut self, message: Message) {
        if let Some(session) = session::find_session_mut(&mut self.sessions, self.active) {
            session.messages.push(message);
        }
    }

    fn report_completed(&self, message: &Message, mode: ChatMode) {
        if let MessageBody::Text { sources, .. } = &message.body {
            if !sources.is_empty() {
                println!("{}", "Sources:".bright_black());
                for source in sources {
                    println!(
                        "  {} {}",
                        source.title.bright_black(),
                        source.uri.bright_blue()
                    );
                }
            }
        }

        if mode == ChatMode::Presentation {
            let document = extract_document(message.text_content());
            if document.len() > MIN_DOCUMENT_LEN {
                println!(
                    "{}",
                    "🎞  Presentation ready - /export saves it as an HTML file".green()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use pkpchat_api::FragmentStream;
    use pkpchat_storage::{MemoryStore, SessionStore};
    use pkpchat_types::{ContextUnit, MessageStatus, Source, StreamFragment};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const DOC: &str = "<!doctype html><html><body><section>Volcanoes erupt molten rock</section></body></html>";

    enum FakeEvent {
        Fragment(StreamFragment),
        Error(String),
    }

    #[derive(Default)]
    struct FakeProvider {
        scripts: Mutex<VecDeque<Vec<FakeEvent>>>,
        image: Mutex<Option<Result<String, ProviderError>>>,
        pub seen_contents: Mutex<Vec<Vec<ContextUnit>>>,
    }

    impl FakeProvider {
        fn script(self, events: Vec<FakeEvent>) -> Self {
            self.scripts.lock().unwrap().push_back(events);
            self
        }

        fn with_image(self, result: Result<String, ProviderError>) -> Self {
            *self.image.lock().unwrap() = Some(result);
            self
        }

        fn next_stream(&self, contents: Vec<ContextUnit>) -> Result<FragmentStream, ProviderError> {
            self.seen_contents.lock().unwrap().push(contents);
            let events = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            let items: Vec<Result<StreamFragment, ProviderError>> = events
                .into_iter()
                .map(|event| match event {
                    FakeEvent::Fragment(fragment) => Ok(fragment),
                    FakeEvent::Error(detail) => Err(ProviderError::Api(detail)),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeProvider {
        async fn generate_title(&self, _prompt: &str) -> String {
            "Volcano Talk".to_string()
        }

        async fn generate_content_stream(
            &self,
            contents: Vec<ContextUnit>,
        ) -> Result<FragmentStream, ProviderError> {
            self.next_stream(contents)
        }

        async fn generate_presentation_stream(
            &self,
            contents: Vec<ContextUnit>,
        ) -> Result<FragmentStream, ProviderError> {
            self.next_stream(contents)
        }

        async fn generate_image(
            &self,
            _prompt: &str,
            _attachment: Option<&Attachment>,
        ) -> Result<String, ProviderError> {
            self.image
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ProviderError::Api("no image scripted".to_string())))
        }
    }

    fn app_with(provider: FakeProvider) -> App<FakeProvider, MemoryStore> {
        App::new(provider, SessionStore::new(MemoryStore::new()), false)
    }

    fn deck_fragments() -> Vec<FakeEvent> {
        let (head, tail) = DOC.split_at(DOC.len() / 2);
        vec![
            FakeEvent::Fragment(StreamFragment::text("Here is your deck:\n")),
            FakeEvent::Fragment(StreamFragment::text(head)),
            FakeEvent::Fragment(StreamFragment::text(tail)),
        ]
    }

    #[tokio::test]
    async fn test_keyword_prompt_becomes_presentation_turn() {
        let provider = FakeProvider::default().script(deck_fragments());
        let mut app = app_with(provider);

        let cancel = CancellationToken::new();
        app.run_turn("Make a presentation about volcanoes", None, &cancel)
            .await
            .unwrap();

        let session = app.active_session().unwrap();
        assert_eq!(session.messages.len(), 2);

        let assistant = session.messages.last().unwrap();
        assert_eq!(assistant.mode(), Some(ChatMode::Presentation));
        assert_eq!(assistant.status, MessageStatus::Complete);

        // The completed buffer yields an exportable document
        let document = extract_document(assistant.text_content());
        assert_eq!(document, DOC);
        assert!(document.len() > MIN_DOCUMENT_LEN);

        // The user message carries the switched mode too
        assert_eq!(session.messages[0].mode(), Some(ChatMode::Presentation));
    }

    #[tokio::test]
    async fn test_first_exchange_generates_title() {
        let provider =
            FakeProvider::default().script(vec![FakeEvent::Fragment(StreamFragment::text("hi"))]);
        let mut app = app_with(provider);

        let cancel = CancellationToken::new();
        app.run_turn("hello there", None, &cancel).await.unwrap();

        assert_eq!(app.active_session().unwrap().title, "Volcano Talk");

        // Persisted state reflects the transcript and the title
        let reloaded = app.store.load();
        assert_eq!(reloaded.sessions.len(), 1);
        assert_eq!(reloaded.sessions[0].title, "Volcano Talk");
        assert_eq!(reloaded.sessions[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_error_becomes_error_message() {
        let provider = FakeProvider::default().script(vec![
            FakeEvent::Fragment(StreamFragment::text("partial")),
            FakeEvent::Error("boom".to_string()),
        ]);
        let mut app = app_with(provider);

        let cancel = CancellationToken::new();
        app.run_turn("hello", None, &cancel).await.unwrap();

        let assistant = app.active_session().unwrap().messages.last().unwrap();
        match &assistant.body {
            MessageBody::Error { message } => assert_eq!(message, GENERIC_FAILURE_TEXT),
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_image_safety_rejection_shown_verbatim() {
        let provider = FakeProvider::default()
            .with_image(Err(ProviderError::SafetyRejected("blocked (SAFETY)".to_string())));
        let mut app = app_with(provider);
        app.selected_mode = ChatMode::Image;

        let cancel = CancellationToken::new();
        app.run_turn("something disallowed", None, &cancel)
            .await
            .unwrap();

        let assistant = app.active_session().unwrap().messages.last().unwrap();
        match &assistant.body {
            MessageBody::Error { message } => {
                assert!(message.contains("blocked (SAFETY)"));
                assert_ne!(message, GENERIC_FAILURE_TEXT);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_image_turn_appends_image_message() {
        let provider = FakeProvider::default()
            .with_image(Ok("data:image/png;base64,QUJD".to_string()));
        let mut app = app_with(provider);
        app.selected_mode = ChatMode::Image;

        let cancel = CancellationToken::new();
        app.run_turn("a volcano at dusk", None, &cancel).await.unwrap();

        let assistant = app.active_session().unwrap().messages.last().unwrap();
        assert!(matches!(&assistant.body, MessageBody::Image { data_uri } if data_uri.starts_with("data:image/png")));
    }

    #[tokio::test]
    async fn test_citations_deduplicated_across_turn() {
        let provider = FakeProvider::default().script(vec![
            FakeEvent::Fragment(StreamFragment {
                text: Some("lava ".to_string()),
                sources: vec![
                    Source { uri: "a".into(), title: "A".into() },
                    Source { uri: "b".into(), title: "B".into() },
                ],
            }),
            FakeEvent::Fragment(StreamFragment {
                text: Some("flows".to_string()),
                sources: vec![
                    Source { uri: "a".into(), title: "A again".into() },
                    Source { uri: "c".into(), title: "C".into() },
                ],
            }),
        ]);
        let mut app = app_with(provider);

        let cancel = CancellationToken::new();
        app.run_turn("tell me about lava", None, &cancel).await.unwrap();

        let assistant = app.active_session().unwrap().messages.last().unwrap();
        match &assistant.body {
            MessageBody::Text { sources, .. } => {
                let uris: Vec<&str> = sources.iter().map(|s| s.uri.as_str()).collect();
                assert_eq!(uris, ["a", "b", "c"]);
                assert_eq!(sources[0].title, "A");
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_turn_redacts_previous_deck_from_context() {
        let provider = FakeProvider::default()
            .script(deck_fragments())
            .script(deck_fragments());
        let mut app = app_with(provider);
        app.selected_mode = ChatMode::Presentation;

        let cancel = CancellationToken::new();
        app.run_turn("deck about volcanoes", None, &cancel).await.unwrap();
        app.run_turn("make the headings red", None, &cancel).await.unwrap();

        let seen = app.provider.seen_contents.lock().unwrap();
        // Second request history: the lone prior deck is the preserve target
        let second = &seen[1];
        let history_text: String = second
            .iter()
            .flat_map(|u| u.parts.iter())
            .filter_map(|p| p.as_text())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(history_text.contains("<!doctype html>"));

        drop(seen);

        // A third turn has two decks in history: only the newest survives
        app.provider = FakeProvider::default().script(deck_fragments());
        app.run_turn("now make the text bigger", None, &cancel).await.unwrap();

        let seen = app.provider.seen_contents.lock().unwrap();
        let third = &seen[0];
        let history_text: String = third
            .iter()
            .flat_map(|u| u.parts.iter())
            .filter_map(|p| p.as_text())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(history_text.matches("<!doctype html>").count(), 1);
        assert_eq!(
            history_text
                .matches("[Presentation HTML Code Omitted to Save Context]")
                .count(),
            1
        );
    }
}
