use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

use crate::controller::SessionView;
use crate::quiz::Question;
use crate::runtime::ScreenRequirement;
use crate::scoring::AttemptRecord;
use crate::session::SessionStatus;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

const RUNNING_HINTS: [&str; 5] = [
    "(↑/↓) choose",
    "(enter) save",
    "(←/→) move",
    "(f10) submit",
    "(ctrl+c) leave",
];

/// `mm:ss`, minutes are not wrapped at the hour.
pub fn format_clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Everything the screen needs for one frame. Built fresh by the binary after
/// every event.
pub struct ExamScreen<'a> {
    pub title: &'a str,
    pub view: &'a SessionView,
    pub question: &'a Question,
    /// The answer currently stored for this question.
    pub recorded: Option<&'a str>,
    /// Highlighted option for choice questions.
    pub selected: usize,
    /// Text typed so far for free-response questions.
    pub draft: &'a str,
    pub attempt: Option<&'a AttemptRecord>,
    pub screen: ScreenRequirement,
}

impl Widget for &ExamScreen<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.view.status {
            SessionStatus::Corrupted => self.render_corrupted(area, buf),
            SessionStatus::Submitted => self.render_submitted(area, buf),
            SessionStatus::Running | SessionStatus::Paused => {
                self.render_exam(area, buf);
                if !self.view.fullscreen {
                    self.render_fullscreen_notice(area, buf);
                } else if self.view.status == SessionStatus::Paused {
                    self.render_warning(area, buf);
                }
            }
        }
    }
}

impl ExamScreen<'_> {
    fn render_exam(&self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(1), // padding
                Constraint::Min(3),    // question
                Constraint::Length(1), // legend
            ])
            .split(area);

        let view = self.view;
        let clock_style = if view.exam_time_left_secs <= 60 {
            bold_style.fg(Color::Red)
        } else {
            bold_style
        };
        let header = Line::from(vec![
            Span::styled(self.title.to_string(), bold_style.fg(Color::Cyan)),
            Span::raw("   "),
            Span::styled(
                format!(
                    "question {}/{}",
                    view.current_question_index + 1,
                    view.question_count
                ),
                dim_style,
            ),
            Span::raw("   "),
            Span::styled(format!("answered {}", view.answered), dim_style),
            Span::raw("   "),
            Span::styled(format_clock(view.exam_time_left_secs), clock_style),
            Span::raw("   "),
            Span::styled(
                format!("violations {}", view.violation_count),
                if view.violation_count > 0 {
                    bold_style.fg(Color::Yellow)
                } else {
                    dim_style
                },
            ),
        ]);
        Paragraph::new(header).render(chunks[0], buf);

        let mut lines = vec![
            Line::from(Span::styled(self.question.prompt.clone(), bold_style)),
            Line::from(""),
        ];

        if self.question.is_free_response() {
            lines.push(Line::from(vec![
                Span::raw("answer: "),
                Span::styled(format!("{}_", self.draft), bold_style.fg(Color::Green)),
            ]));
        } else {
            for (i, option) in self.question.options.iter().enumerate() {
                let marker = if i == self.selected { ">" } else { " " };
                let saved = if self.recorded == Some(option.as_str()) {
                    " ✓"
                } else {
                    ""
                };
                let style = if i == self.selected {
                    bold_style.fg(Color::Green)
                } else {
                    Style::default()
                };
                lines.push(Line::from(Span::styled(
                    format!("{marker} {}. {option}{saved}", i + 1),
                    style,
                )));
            }
        }

        if let Some(recorded) = self.recorded {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("saved: {recorded}"),
                italic_style,
            )));
        }

        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .render(chunks[2], buf);

        Paragraph::new(Span::styled(RUNNING_HINTS.iter().join(" / "), italic_style))
            .render(chunks[3], buf);
    }

    fn render_warning(&self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect(60, 7, area);
        Clear.render(popup, buf);
        let text = vec![
            Line::from(Span::styled(
                format!("Integrity warning ({})", self.view.violation_count),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from("The exam is paused. Another violation ends it."),
            Line::from(Span::styled(
                "press enter to resume",
                Style::default().add_modifier(Modifier::ITALIC),
            )),
        ];
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL))
            .render(popup, buf);
    }

    fn render_fullscreen_notice(&self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect(60, 7, area);
        Clear.render(popup, buf);
        let mut text = vec![
            Line::from(Span::styled(
                "Not full screen",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(format!(
                "Enlarge the terminal to at least {}x{}.",
                self.screen.min_width, self.screen.min_height
            )),
        ];
        if self.view.grace_secs_remaining > 0 {
            text.push(Line::from(Span::styled(
                format!("{}s left before the exam ends", self.view.grace_secs_remaining),
                Style::default().fg(Color::Red),
            )));
        }
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL))
            .render(popup, buf);
    }

    fn render_corrupted(&self, area: Rect, buf: &mut Buffer) {
        let red_bold = Style::default().fg(Color::Red).add_modifier(Modifier::BOLD);
        let reason = self
            .view
            .reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "integrity violation".to_string());
        let text = vec![
            Line::from(Span::styled("EXAM TERMINATED", red_bold)),
            Line::from(""),
            Line::from(format!("reason: {reason}")),
            Line::from(format!("violations: {}", self.view.violation_count)),
            Line::from(Span::styled("score: 0", red_bold)),
            Line::from(""),
            Line::from(Span::styled(
                "(esc)ape",
                Style::default().add_modifier(Modifier::ITALIC),
            )),
        ];
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(margined(area), buf);
    }

    fn render_submitted(&self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let mut text = vec![
            Line::from(Span::styled("SUBMITTED", bold_style.fg(Color::Green))),
            Line::from(""),
        ];
        match self.attempt {
            Some(record) => {
                text.push(Line::from(Span::styled(
                    format!("score {}/{}", record.score, record.max_score),
                    bold_style,
                )));
                text.push(Line::from(format!(
                    "{} of {} correct   {} taken   {} violations",
                    record.correct_count,
                    record.breakdown.len(),
                    format_clock(record.time_taken_secs),
                    record.violation_count
                )));
            }
            None => text.push(Line::from(format!(
                "{} taken",
                format_clock(self.view.time_taken_secs)
            ))),
        }
        text.push(Line::from(""));
        text.push(Line::from(Span::styled(
            "(esc)ape",
            Style::default().add_modifier(Modifier::ITALIC),
        )));
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(margined(area), buf);
    }
}

fn margined(area: Rect) -> Rect {
    Layout::default()
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(1)])
        .split(area)[0]
}

/// A `width_pct` wide, `height` tall rect centered in `area`.
fn centered_rect(width_pct: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_pct) / 2),
            Constraint::Percentage(width_pct),
            Constraint::Percentage((100 - width_pct) / 2),
        ])
        .split(vertical[1])[1]
}
