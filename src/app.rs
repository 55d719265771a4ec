use std::collections::VecDeque;

use ratatui::layout::Rect;
use ratatui::widgets::Paragraph;
use tokio::sync::mpsc;

use crate::input::CaptureEvent;
use crate::links::extract_links;
use crate::pipeline::ChatView;
use crate::state::{Author, MessageId, PendingIndicator, RenderState, Transcript};
use crate::theme::ThemePreference;
use crate::ui::{chat_lines, Palette, CHAT_WRAP};
use crate::voice::VoiceCapture;

/// An image read while a reply was still in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedImage {
    pub file_name: String,
    pub data_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Typing a chat message
    Message,
    /// Typing the path of an image to attach
    AttachPath,
}

/// Terminal-side chat state; the pipeline drives it through [`ChatView`].
pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Transcript and transient state
    pub transcript: Transcript,
    pub indicator: Option<PendingIndicator>,
    pub interim_transcript: Option<String>,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars
    pub attach_input: String,

    // Scrolling
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub theme: ThemePreference,
    pub voice: VoiceCapture,
    pub capture_tx: mpsc::UnboundedSender<CaptureEvent>,
    pub queued_images: VecDeque<QueuedImage>,

    /// Status line text (endpoint, last warning)
    pub status: String,

    // Panel area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
}

impl App {
    pub fn new(
        theme: ThemePreference,
        voice: VoiceCapture,
        capture_tx: mpsc::UnboundedSender<CaptureEvent>,
        status: String,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Message,

            transcript: Transcript::new(),
            indicator: None,
            interim_transcript: None,

            input: String::new(),
            cursor: 0,
            attach_input: String::new(),

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            theme,
            voice,
            capture_tx,
            queued_images: VecDeque::new(),
            status,

            chat_area: None,
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.indicator.is_some() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Replace the text box with a voice transcript, cursor at the end
    pub fn set_input(&mut self, text: String) {
        self.cursor = text.chars().count();
        self.input = text;
    }

    /// Hrefs in the most recent finished bot reply
    pub fn latest_links(&self) -> Vec<String> {
        self.transcript
            .last_complete_bot()
            .map(|m| extract_links(&m.content))
            .unwrap_or_default()
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.total_chat_lines().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    fn wrap_width(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        if self.chat_width > 0 {
            self.chat_width
        } else {
            50
        }
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered line count of the transcript plus any live indicator,
    /// wrapped exactly as the chat panel wraps it
    pub fn total_chat_lines(&self) -> u16 {
        let palette = Palette::for_theme(self.theme);
        let count = Paragraph::new(chat_lines(self, &palette))
            .wrap(CHAT_WRAP)
            .line_count(self.wrap_width());
        u16::try_from(count).unwrap_or(u16::MAX)
    }
}

impl ChatView for App {
    fn append_message(&mut self, author: Author, content: String, state: RenderState) -> MessageId {
        self.transcript.push(author, content, state)
    }

    fn update_message(&mut self, id: MessageId, content: String, state: RenderState) -> bool {
        self.transcript.update(id, content, state)
    }

    fn show_indicator(&mut self, indicator: PendingIndicator) {
        self.indicator = Some(indicator);
        self.animation_frame = 0;
    }

    fn remove_indicator(&mut self) -> bool {
        self.indicator.take().is_some()
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.interim_transcript = None;
    }

    fn scroll_to_bottom(&mut self) {
        let total_lines = self.total_chat_lines();
        let visible_height = self.visible_height();
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn apply_theme(&mut self, theme: ThemePreference) {
        self.theme = theme;
    }
}
