use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::links::{parse_markup, Segment};
use crate::state::{Author, RenderState};
use crate::theme::ThemePreference;

/// Colors for one theme
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub background: Color,
    pub text: Color,
    pub muted: Color,
    pub user: Color,
    pub bot: Color,
    pub link: Color,
    pub border: Color,
    pub accent: Color,
}

impl Palette {
    pub fn for_theme(theme: ThemePreference) -> Self {
        match theme {
            ThemePreference::Light => Self {
                background: Color::White,
                text: Color::Black,
                muted: Color::Gray,
                user: Color::Blue,
                bot: Color::Magenta,
                link: Color::Blue,
                border: Color::Gray,
                accent: Color::Blue,
            },
            ThemePreference::Dark => Self {
                background: Color::Black,
                text: Color::White,
                muted: Color::DarkGray,
                user: Color::Cyan,
                bot: Color::Yellow,
                link: Color::LightBlue,
                border: Color::DarkGray,
                accent: Color::Cyan,
            },
        }
    }
}

/// Convert **bold** markdown in a line fragment to styled spans
fn parse_markdown_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut current_text), base));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(bold_text, base.add_modifier(Modifier::BOLD)));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::styled(current_text, base));
    }
    spans
}

/// Lines for a message body. Completed bot replies carry link markup;
/// user text and anything still animating is plain.
fn message_lines(
    author: Author,
    content: &str,
    state: RenderState,
    palette: &Palette,
) -> Vec<Line<'static>> {
    let base = Style::default().fg(palette.text);

    if author != Author::Bot || state != RenderState::Complete {
        return content
            .split('\n')
            .map(|line| Line::from(parse_markdown_spans(line, base)))
            .collect();
    }

    let link_style = Style::default()
        .fg(palette.link)
        .add_modifier(Modifier::UNDERLINED);

    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();

    for segment in parse_markup(content) {
        match segment {
            Segment::Text(text) => {
                let mut parts = text.split('\n');
                if let Some(first) = parts.next() {
                    current.extend(parse_markdown_spans(first, base));
                }
                for part in parts {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    current.extend(parse_markdown_spans(part, base));
                }
            }
            Segment::Link { label, .. } => current.push(Span::styled(label, link_style)),
        }
    }
    lines.push(Line::from(current));
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let palette = Palette::for_theme(app.theme);

    frame.render_widget(
        Block::default().style(Style::default().bg(palette.background)),
        area,
    );

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area, &palette);
    render_chat(app, frame, chat_area, &palette);
    render_input(app, frame, input_area, &palette);
    render_footer(app, frame, footer_area, &palette);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let title = Line::from(vec![
        Span::styled(" FitBot ", Style::default().fg(palette.accent).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(palette.muted),
        ),
        Span::raw("  "),
        Span::styled(app.status.clone(), Style::default().fg(palette.muted)),
        Span::raw("  "),
        Span::styled(
            format!("[{}]", app.theme.as_str()),
            Style::default().fg(palette.muted),
        ),
    ]);

    frame.render_widget(Paragraph::new(title), area);
}

/// Wrapping of the chat panel, shared with scroll math
pub const CHAT_WRAP: Wrap = Wrap { trim: true };

/// Unwrapped transcript lines, indicator included. Scroll math counts
/// these with the same wrapping `render_chat` uses.
pub fn chat_lines(app: &App, palette: &Palette) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in app.transcript.visible() {
        let (name, color) = match msg.author {
            Author::User => ("You:", palette.user),
            Author::Bot => ("FitBot:", palette.bot),
        };
        lines.push(Line::from(Span::styled(
            name,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        lines.extend(message_lines(msg.author, &msg.content, msg.render_state, palette));
        lines.push(Line::default());
    }

    if let Some(indicator) = app.indicator {
        lines.push(Line::from(Span::styled(
            "FitBot:",
            Style::default().fg(palette.bot).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        let mut label = format!("{}{}", indicator.label(), dots);
        if let Some(interim) = &app.interim_transcript {
            label.push_str(&format!(" \"{}\"", interim));
        }
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(palette.muted).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect, palette: &Palette) {
    // Store area for mouse hit-testing and scroll calculations (inner size minus borders)
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.border))
        .title(" Chat ");

    let lines = chat_lines(app, palette);

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(CHAT_WRAP)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let (title, text, cursor_pos) = match app.input_mode {
        InputMode::Message => (" Message ", app.input.as_str(), app.cursor),
        InputMode::AttachPath => (
            " Image path ",
            app.attach_input.as_str(),
            app.attach_input.chars().count(),
        ),
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.accent))
        .title(title);

    // Horizontal scroll keeps the cursor visible; inner width excludes borders
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = text.chars().skip(scroll_offset).take(inner_width).collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(palette.text))
        .block(input_block);
    frame.render_widget(input, area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let key_style = Style::default().bg(palette.border).fg(palette.background);
    let label_style = Style::default().fg(palette.text);

    let mut hints = match app.input_mode {
        InputMode::Message => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" ^O ", key_style),
            Span::styled(" image ", label_style),
        ],
        InputMode::AttachPath => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" attach ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ],
    };

    if app.voice.is_available() {
        hints.extend(vec![
            Span::styled(" ^R ", key_style),
            Span::styled(if app.voice.is_listening() { " stop " } else { " voice " }, label_style),
        ]);
    }

    hints.extend(vec![
        Span::styled(" ^L ", key_style),
        Span::styled(" open links ", label_style),
        Span::styled(" ^T ", key_style),
        Span::styled(" theme ", label_style),
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" ^C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}
