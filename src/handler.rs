use std::path::PathBuf;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode, QueuedImage};
use crate::input::{spawn_image_read, CaptureEvent};
use crate::pipeline::{ChatView, Pipeline, PipelineEvent, VOICE_FALLBACK};
use crate::state::PendingIndicator;
use crate::theme::{KeyValueStore, ThemeStore};
use crate::tui::AppEvent;
use crate::voice::{VoiceOutcome, VoiceState};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event<S: KeyValueStore>(
    app: &mut App,
    pipeline: &mut Pipeline,
    themes: &mut ThemeStore<S>,
    event: AppEvent,
) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, pipeline, themes, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => app.scroll_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

pub fn handle_pipeline_event(app: &mut App, pipeline: &mut Pipeline, event: PipelineEvent) {
    pipeline.handle(app, event);
    submit_queued_image(app, pipeline);
}

/// Send the oldest image that arrived while the pipeline was busy
fn submit_queued_image(app: &mut App, pipeline: &mut Pipeline) {
    if pipeline.is_busy() {
        return;
    }
    if let Some(image) = app.queued_images.pop_front() {
        tracing::info!(file_name = %image.file_name, "sending queued image");
        pipeline.submit_image(app, &image.file_name, image.data_uri);
    }
}

pub fn handle_capture_event(app: &mut App, pipeline: &mut Pipeline, event: CaptureEvent) {
    match event {
        CaptureEvent::ImageReady { file_name, data_uri } => {
            if pipeline.is_busy() || !app.queued_images.is_empty() {
                tracing::debug!(%file_name, "reply in flight, image queued");
                app.status = format!("Queued {}", file_name);
                app.queued_images.push_back(QueuedImage { file_name, data_uri });
            } else {
                pipeline.submit_image(app, &file_name, data_uri);
            }
        }
        CaptureEvent::ImageFailed { file_name, error } => {
            tracing::warn!(%file_name, %error, "could not read image");
        }
        CaptureEvent::Voice(event) => match app.voice.handle(event) {
            VoiceOutcome::Ignored => {}
            VoiceOutcome::Interim(text) => app.interim_transcript = Some(text),
            VoiceOutcome::Transcript(text) => {
                clear_listening(app);
                app.set_input(text);
            }
            VoiceOutcome::Failed(_) => {
                clear_listening(app);
                pipeline.post_notice(app, VOICE_FALLBACK);
            }
            VoiceOutcome::Finished => clear_listening(app),
        },
    }
}

fn clear_listening(app: &mut App) {
    app.interim_transcript = None;
    if app.indicator == Some(PendingIndicator::Listening) {
        app.remove_indicator();
        app.scroll_to_bottom();
    }
}

fn handle_key<S: KeyValueStore>(
    app: &mut App,
    pipeline: &mut Pipeline,
    themes: &mut ThemeStore<S>,
    key: KeyEvent,
) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    match key.code {
        KeyCode::Char('c') if ctrl => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('t') if ctrl => {
            toggle_theme(app, themes);
            return;
        }
        KeyCode::Char('l') if ctrl => {
            for href in app.latest_links() {
                open_url(&href);
            }
            return;
        }
        KeyCode::PageUp => {
            app.scroll_up(app.chat_height / 2);
            return;
        }
        KeyCode::PageDown => {
            app.scroll_down(app.chat_height / 2);
            return;
        }
        _ => {}
    }

    match app.input_mode {
        InputMode::Message => handle_message_mode(app, pipeline, key),
        InputMode::AttachPath => handle_attach_mode(app, key),
    }
}

fn toggle_theme<S: KeyValueStore>(app: &mut App, themes: &mut ThemeStore<S>) {
    match themes.toggle() {
        Ok(theme) => app.apply_theme(theme),
        Err(e) => {
            tracing::warn!(error = %e, "could not persist theme");
            app.status = format!("Theme not saved: {}", e);
        }
    }
}

fn toggle_voice(app: &mut App, pipeline: &mut Pipeline) {
    if pipeline.is_busy() {
        tracing::debug!("voice toggle ignored while a reply is in flight");
        return;
    }

    match app.voice.toggle(app.capture_tx.clone()) {
        Ok(VoiceState::Listening) => {
            app.show_indicator(PendingIndicator::Listening);
            app.scroll_to_bottom();
        }
        Ok(VoiceState::Idle) => clear_listening(app),
        Err(e) => {
            tracing::warn!(error = %e, "could not start voice input");
            clear_listening(app);
            pipeline.post_notice(app, VOICE_FALLBACK);
        }
    }
}

fn handle_message_mode(app: &mut App, pipeline: &mut Pipeline, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('o') if ctrl => {
            app.attach_input.clear();
            app.input_mode = InputMode::AttachPath;
        }
        KeyCode::Char('r') if ctrl => toggle_voice(app, pipeline),
        KeyCode::Enter => {
            if pipeline.is_busy() {
                return;
            }
            if app.voice.is_listening() {
                app.voice.stop();
                clear_listening(app);
            }
            let raw = app.input.clone();
            pipeline.submit_text(app, &raw);
        }
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) if !ctrl => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn handle_attach_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.attach_input.clear();
            app.input_mode = InputMode::Message;
        }
        KeyCode::Enter => {
            let path = expand_path(app.attach_input.trim());
            app.attach_input.clear();
            app.input_mode = InputMode::Message;
            if let Some(path) = path {
                spawn_image_read(path, app.capture_tx.clone());
            }
        }
        KeyCode::Backspace => {
            app.attach_input.pop();
        }
        KeyCode::Char(c) => {
            app.attach_input.push(c);
        }
        _ => {}
    }
}

/// Expand a leading `~` to the home directory
fn expand_path(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    Some(PathBuf::from(raw))
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

fn open_url(url: &str) {
    use std::process::{Command, Stdio};

    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    if let Err(e) = Command::new(opener)
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        tracing::warn!(%url, error = %e, "could not open link");
    }
}
