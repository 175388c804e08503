//! Response stream aggregation.
//!
//! Consumes the lazy, producer-controlled sequence of fragments for one
//! in-progress assistant message and folds them into that message's state
//! as they arrive: content is append-only, sources only grow, and folding
//! strictly follows arrival order.

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use pkpchat_types::{ChatMode, Message, MessageBody, MessageStatus, StreamFragment};

/// User-facing text for a transient provider failure mid-stream
pub const GENERIC_FAILURE_TEXT: &str =
    "Something went wrong while generating a response. Please try again.";

/// Folds stream fragments into the single in-progress assistant message of
/// one turn.
pub struct TurnAggregator {
    message: Message,
}

impl TurnAggregator {
    pub fn new(mode: ChatMode) -> Self {
        Self {
            message: Message::assistant_in_progress(mode),
        }
    }

    /// Resume aggregation into an existing in-progress message (e.g. one
    /// already appended to the session for rendering).
    pub fn resume(message: Message) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Fold one fragment: append the text delta, merge the citation batch.
    /// Citations are deduplicated by `uri`; the first-seen title wins and
    /// insertion order is preserved.
    pub fn apply(&mut self, fragment: StreamFragment) {
        if let MessageBody::Text { content, sources, .. } = &mut self.message.body {
            if let Some(delta) = fragment.text {
                content.push_str(&delta);
            }
            for source in fragment.sources {
                if !sources.iter().any(|s| s.uri == source.uri) {
                    sources.push(source);
                }
            }
        }
    }

    /// Finalize the message unconditionally, even after zero fragments, so
    /// the UI never shows a permanently spinning turn.
    pub fn finish(mut self) -> Message {
        self.message.status = MessageStatus::Complete;
        self.message
    }

    /// Replace the message wholesale with a user-facing error.
    pub fn fail(mut self, message: impl Into<String>) -> Message {
        self.message.body = MessageBody::Error {
            message: message.into(),
        };
        self.message.status = MessageStatus::Complete;
        self.message
    }
}

/// How a turn's stream consumption ended
#[derive(Debug)]
pub enum TurnOutcome {
    Completed(Message),
    Failed { message: Message, detail: String },
    /// The partial message is discarded, not finalized; the session goes
    /// back to its pre-turn state except the user's own message.
    Cancelled,
}

/// Drive a fragment stream to completion, folding each fragment into the
/// aggregator and invoking `on_fragment` after each fold so the caller can
/// repaint.
///
/// The stream is pull-based and single-pass. The cancellation token is
/// honored at every suspension point: a fragment already being processed
/// completes, but no further fragment is requested afterwards.
pub async fn drive_stream<S, E>(
    mut aggregator: TurnAggregator,
    stream: S,
    cancel: &CancellationToken,
    mut on_fragment: impl FnMut(&Message),
) -> TurnOutcome
where
    S: Stream<Item = Result<StreamFragment, E>>,
    E: std::fmt::Display,
{
    futures_util::pin_mut!(stream);

    loop {
        if cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TurnOutcome::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(fragment)) => {
                aggregator.apply(fragment);
                on_fragment(aggregator.message());
            }
            Some(Err(e)) => {
                let detail = e.to_string();
                return TurnOutcome::Failed {
                    message: aggregator.fail(GENERIC_FAILURE_TEXT),
                    detail,
                };
            }
            None => return TurnOutcome::Completed(aggregator.finish()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session;
    use futures::stream;
    use pkpchat_types::{Session, Source};

    fn src(uri: &str, title: &str) -> Source {
        Source {
            uri: uri.to_string(),
            title: title.to_string(),
        }
    }

    fn ok_fragments(
        fragments: Vec<StreamFragment>,
    ) -> impl Stream<Item = Result<StreamFragment, String>> {
        stream::iter(fragments.into_iter().map(Ok))
    }

    #[test]
    fn test_source_dedup_keeps_order_and_first_title() {
        let mut agg = TurnAggregator::new(ChatMode::Text);
        agg.apply(StreamFragment::sources(vec![
            src("a", "A first"),
            src("b", "B"),
        ]));
        agg.apply(StreamFragment::sources(vec![
            src("a", "A second"),
            src("c", "C"),
        ]));

        let message = agg.finish();
        match message.body {
            MessageBody::Text { sources, .. } => {
                let uris: Vec<&str> = sources.iter().map(|s| s.uri.as_str()).collect();
                assert_eq!(uris, ["a", "b", "c"]);
                assert_eq!(sources[0].title, "A first");
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_content_is_append_only() {
        let mut agg = TurnAggregator::new(ChatMode::Text);
        agg.apply(StreamFragment::text("Hello"));
        agg.apply(StreamFragment::text(", world"));
        assert_eq!(agg.message().text_content(), "Hello, world");
    }

    #[tokio::test]
    async fn test_empty_stream_still_finalizes() {
        let cancel = CancellationToken::new();
        let outcome = drive_stream(
            TurnAggregator::new(ChatMode::Text),
            ok_fragments(vec![]),
            &cancel,
            |_| {},
        )
        .await;

        match outcome {
            TurnOutcome::Completed(message) => {
                assert_eq!(message.status, MessageStatus::Complete);
                assert_eq!(message.text_content(), "");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_replaces_content_wholesale() {
        let fragments = vec![
            Ok(StreamFragment::text("partial ")),
            Err("connection reset".to_string()),
        ];
        let cancel = CancellationToken::new();
        let outcome = drive_stream(
            TurnAggregator::new(ChatMode::Text),
            stream::iter(fragments),
            &cancel,
            |_| {},
        )
        .await;

        match outcome {
            TurnOutcome::Failed { message, detail } => {
                assert_eq!(detail, "connection reset");
                assert_eq!(message.status, MessageStatus::Complete);
                match message.body {
                    MessageBody::Error { message } => {
                        assert_eq!(message, GENERIC_FAILURE_TEXT)
                    }
                    other => panic!("unexpected body: {:?}", other),
                }
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_restores_pre_turn_state() {
        let mut session = Session::new();
        session
            .messages
            .push(Message::user_text("make it rain", ChatMode::Text));
        let pre_turn = session.messages.clone();

        // The in-progress message joins the session so the UI can render it
        let agg = TurnAggregator::new(ChatMode::Text);
        let in_progress_id = agg.message().id;
        session.messages.push(agg.message().clone());

        let cancel = CancellationToken::new();
        let mut folded = 0;
        let fragments: Vec<Result<StreamFragment, String>> =
            (0..5).map(|i| Ok(StreamFragment::text(format!("f{}", i)))).collect();

        let outcome = drive_stream(agg, stream::iter(fragments), &cancel, |message| {
            folded += 1;
            session::replace_message(&mut session, message);
            if folded == 2 {
                cancel.cancel();
            }
        })
        .await;

        assert!(matches!(outcome, TurnOutcome::Cancelled));
        assert_eq!(folded, 2);

        session::discard_message(&mut session, in_progress_id);
        assert_eq!(session.messages, pre_turn);
        assert_eq!(session.messages.last().unwrap().text_content(), "make it rain");
    }

    #[tokio::test]
    async fn test_fragments_fold_in_arrival_order() {
        let fragments = vec![
            StreamFragment::text("one "),
            StreamFragment {
                text: Some("two ".to_string()),
                sources: vec![src("u", "U")],
            },
            StreamFragment::text("three"),
        ];
        let cancel = CancellationToken::new();
        let outcome = drive_stream(
            TurnAggregator::new(ChatMode::Text),
            ok_fragments(fragments),
            &cancel,
            |_| {},
        )
        .await;

        match outcome {
            TurnOutcome::Completed(message) => {
                assert_eq!(message.text_content(), "one two three");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
