//! The message pipeline.
//!
//! One submission cycle runs: submit (user message, input cleared) ->
//! await (indicator, one request) -> resolve (indicator removed, fallback
//! on failure) -> animate (one character per tick, links formatted once
//! at the end). Work off the main loop reports back as [`PipelineEvent`]s
//! tagged with the cycle number; events from an older cycle are dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::input::OutboundPayload;
use crate::links::format_links;
use crate::responder::Responder;
use crate::state::{Author, MessageId, PendingIndicator, RenderState};
use crate::theme::ThemePreference;

pub const TEXT_FALLBACK: &str = "Sorry, there was an error processing your request.";
pub const IMAGE_FALLBACK: &str = "Sorry, there was an error analyzing your image.";
pub const VOICE_FALLBACK: &str = "Sorry, I couldn't hear that. Please try again.";

/// Everything the pipeline is allowed to touch on screen
pub trait ChatView {
    fn append_message(&mut self, author: Author, content: String, state: RenderState) -> MessageId;
    /// Returns `false` if the message no longer exists.
    fn update_message(&mut self, id: MessageId, content: String, state: RenderState) -> bool;
    /// Replaces any live indicator.
    fn show_indicator(&mut self, indicator: PendingIndicator);
    /// Idempotent; returns whether an indicator was live.
    fn remove_indicator(&mut self) -> bool;
    fn clear_input(&mut self);
    fn scroll_to_bottom(&mut self);
    fn apply_theme(&mut self, theme: ThemePreference);
}

#[derive(Debug)]
pub enum PipelineEvent {
    Reply { cycle: u64, result: Result<String> },
    Reveal { cycle: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Text,
    Image,
    Welcome,
}

impl CycleKind {
    fn fallback(&self) -> &'static str {
        match self {
            CycleKind::Image => IMAGE_FALLBACK,
            CycleKind::Text | CycleKind::Welcome => TEXT_FALLBACK,
        }
    }
}

struct InFlight {
    cycle: u64,
    kind: CycleKind,
    task: JoinHandle<()>,
}

struct Animation {
    cycle: u64,
    kind: CycleKind,
    message: MessageId,
    text: String,
    chars: Vec<char>,
    revealed: usize,
    task: Option<JoinHandle<()>>,
}

pub struct Pipeline {
    responder: Arc<dyn Responder>,
    tx: mpsc::UnboundedSender<PipelineEvent>,
    char_delay: Duration,
    cycle: u64,
    in_flight: Option<InFlight>,
    animation: Option<Animation>,
}

impl Pipeline {
    pub fn new(
        responder: Arc<dyn Responder>,
        char_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = Self {
            responder,
            tx,
            char_delay,
            cycle: 0,
            in_flight: None,
            animation: None,
        };
        (pipeline, rx)
    }

    /// A submission cycle is waiting on the backend or still animating.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
            || self
                .animation
                .as_ref()
                .is_some_and(|a| a.kind != CycleKind::Welcome)
    }

    /// Nothing in flight and nothing animating, welcome included
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.animation.is_none()
    }

    pub fn current_cycle(&self) -> u64 {
        self.cycle
    }

    /// Submit the text box contents. Whitespace-only input and submissions
    /// while busy are ignored and leave the input untouched.
    pub fn submit_text(&mut self, view: &mut impl ChatView, raw: &str) -> bool {
        let Some(text) = crate::input::normalize_text(raw) else {
            return false;
        };
        self.submit(view, text.clone(), OutboundPayload::Text(text))
    }

    /// Submit an image that has already been read into a data URI.
    pub fn submit_image(&mut self, view: &mut impl ChatView, file_name: &str, data_uri: String) -> bool {
        self.submit(view, format!("[image: {}]", file_name), OutboundPayload::Image(data_uri))
    }

    fn submit(&mut self, view: &mut impl ChatView, shown: String, payload: OutboundPayload) -> bool {
        if self.is_busy() {
            tracing::debug!(cycle = self.cycle, "submission ignored while a reply is in flight");
            return false;
        }
        self.settle_animation(view);

        view.append_message(Author::User, shown, RenderState::Complete);
        view.clear_input();
        view.scroll_to_bottom();

        self.cycle += 1;
        let cycle = self.cycle;
        let kind = if payload.is_image() {
            CycleKind::Image
        } else {
            CycleKind::Text
        };

        view.show_indicator(match kind {
            CycleKind::Image => PendingIndicator::Analyzing,
            _ => PendingIndicator::Typing,
        });
        view.scroll_to_bottom();

        let responder = Arc::clone(&self.responder);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let result = responder.respond(&payload).await;
            let _ = tx.send(PipelineEvent::Reply { cycle, result });
        });

        tracing::info!(cycle, ?kind, "request sent");
        self.in_flight = Some(InFlight { cycle, kind, task });
        true
    }

    /// Append the welcome message hidden, then reveal it after `delay`.
    pub fn start_welcome(&mut self, view: &mut impl ChatView, text: &str, delay: Duration) {
        if text.is_empty() {
            return;
        }
        self.settle_animation(view);

        self.cycle += 1;
        let message = view.append_message(Author::Bot, String::new(), RenderState::Pending);
        self.animate(view, self.cycle, CycleKind::Welcome, message, text.to_string(), delay);
    }

    /// Append a finished bot message outside any cycle (e.g. voice errors).
    pub fn post_notice(&mut self, view: &mut impl ChatView, text: &str) {
        view.append_message(Author::Bot, text.to_string(), RenderState::Complete);
        view.scroll_to_bottom();
    }

    pub fn handle(&mut self, view: &mut impl ChatView, event: PipelineEvent) {
        match event {
            PipelineEvent::Reply { cycle, result } => self.on_reply(view, cycle, result),
            PipelineEvent::Reveal { cycle } => self.on_reveal(view, cycle),
        }
    }

    fn on_reply(&mut self, view: &mut impl ChatView, cycle: u64, result: Result<String>) {
        let kind = match self.in_flight.take() {
            Some(f) if f.cycle == cycle => f.kind,
            other => {
                self.in_flight = other;
                tracing::debug!(cycle, "dropping stale reply");
                return;
            }
        };

        view.remove_indicator();
        view.scroll_to_bottom();

        match result {
            Ok(text) => {
                let message = view.append_message(Author::Bot, String::new(), RenderState::Animating);
                view.scroll_to_bottom();
                self.animate(view, cycle, kind, message, text, Duration::ZERO);
            }
            Err(err) => {
                tracing::warn!(cycle, ?kind, error = %err, "reply failed");
                view.append_message(Author::Bot, kind.fallback().to_string(), RenderState::Complete);
                view.scroll_to_bottom();
            }
        }
    }

    fn animate(
        &mut self,
        view: &mut impl ChatView,
        cycle: u64,
        kind: CycleKind,
        message: MessageId,
        text: String,
        start_delay: Duration,
    ) {
        let chars: Vec<char> = text.chars().collect();
        let steps = chars.len();

        let mut animation = Animation {
            cycle,
            kind,
            message,
            text,
            chars,
            revealed: 0,
            task: None,
        };

        if steps == 0 {
            Self::finish(view, animation);
            return;
        }

        let tx = self.tx.clone();
        let delay = self.char_delay;
        animation.task = Some(tokio::spawn(async move {
            if !start_delay.is_zero() {
                tokio::time::sleep(start_delay).await;
            }
            for _ in 0..steps {
                tokio::time::sleep(delay).await;
                if tx.send(PipelineEvent::Reveal { cycle }).is_err() {
                    break;
                }
            }
        }));
        self.animation = Some(animation);
    }

    fn on_reveal(&mut self, view: &mut impl ChatView, cycle: u64) {
        let Some(animation) = self.animation.as_mut().filter(|a| a.cycle == cycle) else {
            tracing::trace!(cycle, "dropping stale reveal");
            return;
        };

        animation.revealed = (animation.revealed + 1).min(animation.chars.len());
        let prefix: String = animation.chars[..animation.revealed].iter().collect();

        if !view.update_message(animation.message, prefix, RenderState::Animating) {
            tracing::debug!(cycle, "animated message vanished, cancelling");
            if let Some(animation) = self.animation.take() {
                if let Some(task) = animation.task {
                    task.abort();
                }
            }
            return;
        }
        view.scroll_to_bottom();

        if animation.revealed == animation.chars.len() {
            if let Some(animation) = self.animation.take() {
                Self::finish(view, animation);
            }
        }
    }

    /// Jump an unfinished animation straight to its completed state.
    fn settle_animation(&mut self, view: &mut impl ChatView) {
        if let Some(animation) = self.animation.take() {
            tracing::debug!(cycle = animation.cycle, "settling animation early");
            Self::finish(view, animation);
        }
    }

    fn finish(view: &mut impl ChatView, animation: Animation) {
        if let Some(task) = animation.task {
            task.abort();
        }
        view.update_message(animation.message, format_links(&animation.text), RenderState::Complete);
        view.scroll_to_bottom();
        tracing::info!(cycle = animation.cycle, kind = ?animation.kind, "reply complete");
    }

    /// Abort background work, e.g. on quit.
    pub fn shutdown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
        if let Some(animation) = self.animation.take() {
            if let Some(task) = animation.task {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::links::VIDEO_CAPTION;
    use crate::state::Transcript;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Append(MessageId, Author, RenderState),
        Update(MessageId, RenderState),
        ShowIndicator(PendingIndicator),
        RemoveIndicator,
        ClearInput,
        Scroll,
    }

    #[derive(Default)]
    struct RecordingView {
        transcript: Transcript,
        indicator: Option<PendingIndicator>,
        ops: Vec<Op>,
    }

    impl RecordingView {
        fn count(&self, op: &Op) -> usize {
            self.ops.iter().filter(|o| *o == op).count()
        }

        fn position(&self, op: &Op) -> Option<usize> {
            self.ops.iter().position(|o| o == op)
        }

        fn authors(&self) -> Vec<Author> {
            self.transcript.iter().map(|m| m.author).collect()
        }
    }

    impl ChatView for RecordingView {
        fn append_message(&mut self, author: Author, content: String, state: RenderState) -> MessageId {
            let id = self.transcript.push(author, content, state);
            self.ops.push(Op::Append(id, author, state));
            id
        }

        fn update_message(&mut self, id: MessageId, content: String, state: RenderState) -> bool {
            self.ops.push(Op::Update(id, state));
            self.transcript.update(id, content, state)
        }

        fn show_indicator(&mut self, indicator: PendingIndicator) {
            self.ops.push(Op::ShowIndicator(indicator));
            self.indicator = Some(indicator);
        }

        fn remove_indicator(&mut self) -> bool {
            self.ops.push(Op::RemoveIndicator);
            self.indicator.take().is_some()
        }

        fn clear_input(&mut self) {
            self.ops.push(Op::ClearInput);
        }

        fn scroll_to_bottom(&mut self) {
            self.ops.push(Op::Scroll);
        }

        fn apply_theme(&mut self, _theme: ThemePreference) {}
    }

    /// Answers every payload with the same canned result
    struct CannedResponder {
        reply: std::result::Result<String, ChatError>,
        seen: Mutex<Vec<OutboundPayload>>,
    }

    impl CannedResponder {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn err(error: ChatError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(error),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<OutboundPayload> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Responder for CannedResponder {
        async fn respond(&self, payload: &OutboundPayload) -> Result<String> {
            self.seen.lock().unwrap().push(payload.clone());
            self.reply.clone()
        }
    }

    /// Never answers
    struct SilentResponder;

    #[async_trait]
    impl Responder for SilentResponder {
        async fn respond(&self, _payload: &OutboundPayload) -> Result<String> {
            std::future::pending().await
        }
    }

    async fn run_until_idle(
        pipeline: &mut Pipeline,
        rx: &mut mpsc::UnboundedReceiver<PipelineEvent>,
        view: &mut RecordingView,
    ) {
        while !pipeline.is_idle() {
            let event = rx.recv().await.expect("pipeline channel closed");
            pipeline.handle(view, event);
        }
    }

    fn delay() -> Duration {
        Duration::from_millis(25)
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_cycle_appends_one_user_and_one_bot_message() {
        let responder = CannedResponder::ok("Do 3x10 squats.");
        let (mut pipeline, mut rx) = Pipeline::new(responder.clone(), delay());
        let mut view = RecordingView::default();

        assert!(pipeline.submit_text(&mut view, "  leg day?  "));
        run_until_idle(&mut pipeline, &mut rx, &mut view).await;

        assert_eq!(view.authors(), vec![Author::User, Author::Bot]);
        assert_eq!(view.transcript.get(0).unwrap().content, "leg day?");
        let bot = view.transcript.get(1).unwrap();
        assert_eq!(bot.content, "Do 3x10 squats.");
        assert_eq!(bot.render_state, RenderState::Complete);
        assert_eq!(responder.requests(), vec![OutboundPayload::Text("leg day?".to_string())]);
        assert_eq!(view.count(&Op::ClearInput), 1);
        assert!(!pipeline.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_submission_gets_exactly_one_reply() {
        let (mut pipeline, mut rx) = Pipeline::new(CannedResponder::ok("ok"), delay());
        let mut view = RecordingView::default();

        for input in ["a", "  push-ups ", "how many rest days?"] {
            assert!(pipeline.submit_text(&mut view, input));
            run_until_idle(&mut pipeline, &mut rx, &mut view).await;
        }

        assert_eq!(
            view.authors(),
            vec![Author::User, Author::Bot, Author::User, Author::Bot, Author::User, Author::Bot]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_is_noop() {
        let responder = CannedResponder::ok("unused");
        let (mut pipeline, _rx) = Pipeline::new(responder.clone(), delay());
        let mut view = RecordingView::default();

        assert!(!pipeline.submit_text(&mut view, ""));
        assert!(!pipeline.submit_text(&mut view, "   \t "));
        assert!(view.transcript.is_empty());
        assert!(view.ops.is_empty());
        tokio::task::yield_now().await;
        assert!(responder.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_steps_match_length_and_scroll_each_step() {
        let text = "Rest 90s.";
        let (mut pipeline, mut rx) = Pipeline::new(CannedResponder::ok(text), delay());
        let mut view = RecordingView::default();

        pipeline.submit_text(&mut view, "rest?");
        run_until_idle(&mut pipeline, &mut rx, &mut view).await;

        let bot_id = 1;
        let step = Op::Update(bot_id, RenderState::Animating);
        assert_eq!(view.count(&step), text.chars().count());

        for (i, op) in view.ops.iter().enumerate() {
            if *op == step {
                assert_eq!(view.ops.get(i + 1), Some(&Op::Scroll));
            }
        }

        // Completion comes after the last reveal step
        let complete = view.position(&Op::Update(bot_id, RenderState::Complete)).unwrap();
        let last_step = view.ops.iter().rposition(|o| *o == step).unwrap();
        assert!(complete > last_step);
    }

    #[tokio::test(start_paused = true)]
    async fn test_links_formatted_once_at_completion() {
        let text = "Watch https://youtu.be/abc123";
        let (mut pipeline, mut rx) = Pipeline::new(CannedResponder::ok(text), delay());
        let mut view = RecordingView::default();

        pipeline.submit_text(&mut view, "video?");

        // Partway through, content is still plain text
        while view.count(&Op::Update(1, RenderState::Animating)) < 8 {
            let event = rx.recv().await.unwrap();
            pipeline.handle(&mut view, event);
        }
        assert_eq!(view.transcript.get(1).unwrap().content, "Watch ht");

        run_until_idle(&mut pipeline, &mut rx, &mut view).await;
        let content = &view.transcript.get(1).unwrap().content;
        assert!(content.contains(VIDEO_CAPTION));
        assert_eq!(content.matches("<a ").count(), 1);
        assert_eq!(view.count(&Op::Update(1, RenderState::Complete)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_removed_before_reply_on_success() {
        let (mut pipeline, mut rx) = Pipeline::new(CannedResponder::ok("hi"), delay());
        let mut view = RecordingView::default();

        pipeline.submit_text(&mut view, "hello");
        assert_eq!(view.indicator, Some(PendingIndicator::Typing));
        run_until_idle(&mut pipeline, &mut rx, &mut view).await;

        let removed = view.position(&Op::RemoveIndicator).unwrap();
        let appended = view.position(&Op::Append(1, Author::Bot, RenderState::Animating)).unwrap();
        assert!(removed < appended);
        assert_eq!(view.indicator, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_appends_fallback() {
        let responder = CannedResponder::err(ChatError::Transport("refused".to_string()));
        let (mut pipeline, mut rx) = Pipeline::new(responder, delay());
        let mut view = RecordingView::default();

        pipeline.submit_text(&mut view, "hello");
        run_until_idle(&mut pipeline, &mut rx, &mut view).await;

        let bot = view.transcript.get(1).unwrap();
        assert_eq!(bot.content, TEXT_FALLBACK);
        assert_eq!(bot.render_state, RenderState::Complete);

        let removed = view.position(&Op::RemoveIndicator).unwrap();
        let appended = view.position(&Op::Append(1, Author::Bot, RenderState::Complete)).unwrap();
        assert!(removed < appended);
        assert_eq!(view.indicator, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_cycle_uses_analyzing_indicator_and_image_fallback() {
        let responder = CannedResponder::err(ChatError::Backend("true".to_string()));
        let (mut pipeline, mut rx) = Pipeline::new(responder.clone(), delay());
        let mut view = RecordingView::default();

        assert!(pipeline.submit_image(&mut view, "meal.png", "data:image/png;base64,AA==".to_string()));
        assert_eq!(view.indicator, Some(PendingIndicator::Analyzing));
        run_until_idle(&mut pipeline, &mut rx, &mut view).await;

        assert_eq!(view.transcript.get(0).unwrap().content, "[image: meal.png]");
        assert_eq!(view.transcript.get(1).unwrap().content, IMAGE_FALLBACK);
        assert_eq!(
            responder.requests(),
            vec![OutboundPayload::Image("data:image/png;base64,AA==".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_rejected_while_busy() {
        let (mut pipeline, _rx) = Pipeline::new(Arc::new(SilentResponder), delay());
        let mut view = RecordingView::default();

        assert!(pipeline.submit_text(&mut view, "first"));
        assert!(pipeline.is_busy());
        assert!(!pipeline.submit_text(&mut view, "second"));
        assert_eq!(view.transcript.len(), 1);
        assert_eq!(view.count(&Op::ClearInput), 1);

        pipeline.shutdown();
        assert!(pipeline.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_events_are_dropped() {
        let (mut pipeline, _rx) = Pipeline::new(Arc::new(SilentResponder), delay());
        let mut view = RecordingView::default();

        pipeline.submit_text(&mut view, "first");
        let before = view.ops.len();

        pipeline.handle(
            &mut view,
            PipelineEvent::Reply {
                cycle: pipeline.current_cycle() + 5,
                result: Ok("late".to_string()),
            },
        );
        pipeline.handle(&mut view, PipelineEvent::Reveal { cycle: 0 });

        assert_eq!(view.ops.len(), before);
        assert!(pipeline.is_busy());
        pipeline.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_reply_completes_without_steps() {
        let (mut pipeline, mut rx) = Pipeline::new(CannedResponder::ok(""), delay());
        let mut view = RecordingView::default();

        pipeline.submit_text(&mut view, "anything");
        run_until_idle(&mut pipeline, &mut rx, &mut view).await;

        assert_eq!(view.count(&Op::Update(1, RenderState::Animating)), 0);
        assert_eq!(view.transcript.get(1).unwrap().render_state, RenderState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_welcome_hidden_until_reveal_starts() {
        let (mut pipeline, mut rx) = Pipeline::new(CannedResponder::ok("unused"), delay());
        let mut view = RecordingView::default();

        pipeline.start_welcome(&mut view, "Hi there", Duration::from_millis(400));
        let welcome = view.transcript.get(0).unwrap();
        assert_eq!(welcome.render_state, RenderState::Pending);
        assert!(!welcome.is_visible());
        assert!(!pipeline.is_busy());

        let event = rx.recv().await.unwrap();
        pipeline.handle(&mut view, event);
        assert_eq!(view.transcript.get(0).unwrap().render_state, RenderState::Animating);
        assert_eq!(view.transcript.get(0).unwrap().content, "H");

        run_until_idle(&mut pipeline, &mut rx, &mut view).await;
        assert_eq!(view.transcript.get(0).unwrap().content, "Hi there");
        assert_eq!(view.transcript.get(0).unwrap().render_state, RenderState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_settles_welcome_animation() {
        let (mut pipeline, mut rx) = Pipeline::new(CannedResponder::ok("Sure."), delay());
        let mut view = RecordingView::default();

        pipeline.start_welcome(&mut view, "Welcome to the gym", Duration::from_millis(400));
        assert!(pipeline.submit_text(&mut view, "hi"));

        let welcome = view.transcript.get(0).unwrap();
        assert_eq!(welcome.content, "Welcome to the gym");
        assert_eq!(welcome.render_state, RenderState::Complete);

        run_until_idle(&mut pipeline, &mut rx, &mut view).await;
        assert_eq!(view.transcript.in_flight_bot_count(), 0);
        assert_eq!(view.authors(), vec![Author::Bot, Author::User, Author::Bot]);
        // The settled welcome must not receive further reveal steps
        assert_eq!(view.count(&Op::Update(0, RenderState::Animating)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_notice() {
        let (mut pipeline, _rx) = Pipeline::new(CannedResponder::ok("unused"), delay());
        let mut view = RecordingView::default();

        pipeline.post_notice(&mut view, VOICE_FALLBACK);
        assert_eq!(view.transcript.get(0).unwrap().content, VOICE_FALLBACK);
        assert_eq!(view.ops.last(), Some(&Op::Scroll));
    }
}
