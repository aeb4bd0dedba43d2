use super::presentation::{DisplayState, Tone};
use super::sink::{RenderHandle, RenderSink};
use crate::error::RenderError;
use async_trait::async_trait;
use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, IsTerminal, Stdout, Write};
use std::sync::Mutex;
use unicode_width::UnicodeWidthChar;

const FALLBACK_WIDTH: usize = 80;

/// Renders displays in place on a terminal. Each edit moves the cursor back
/// over the rows printed by the previous render and redraws. Once a render
/// no longer fits on screen the sink stops redrawing and only appends the
/// finished display.
pub struct TerminalSink<W: Write + Send> {
    inner: Mutex<TerminalState<W>>,
    interactive: bool,
    height: Option<usize>,
}

struct TerminalState<W> {
    out: W,
    printed_rows: usize,
    posted: u64,
    width: usize,
    overflowed: bool,
}

impl TerminalSink<Stdout> {
    pub fn stdout() -> Self {
        let interactive = io::stdout().is_terminal();
        let size = crossterm::terminal::size().ok();
        let width = size
            .map(|(columns, _)| usize::from(columns))
            .filter(|columns| *columns > 0)
            .unwrap_or(FALLBACK_WIDTH);
        let sink = Self::new(io::stdout(), interactive, width);
        match size.map(|(_, rows)| usize::from(rows)).filter(|rows| *rows > 0) {
            Some(rows) => sink.with_height(rows),
            None => sink,
        }
    }
}

impl<W: Write + Send> TerminalSink<W> {
    /// A non-interactive sink only prints finished (`Done`/`Error`) displays.
    pub fn new(out: W, interactive: bool, width: usize) -> Self {
        Self {
            inner: Mutex::new(TerminalState {
                out,
                printed_rows: 0,
                posted: 0,
                width: width.max(1),
                overflowed: false,
            }),
            interactive,
            height: None,
        }
    }

    /// Screen rows available for in-place redraws.
    pub fn with_height(mut self, rows: usize) -> Self {
        self.height = Some(rows.max(1));
        self
    }

    pub fn into_inner(self) -> W {
        match self.inner.into_inner() {
            Ok(state) => state.out,
            Err(poisoned) => poisoned.into_inner().out,
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut TerminalState<W>) -> io::Result<T>,
    ) -> Result<T, RenderError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| RenderError::Transient("terminal state lock poisoned".to_string()))?;
        Ok(f(&mut guard)?)
    }

    fn should_print(&self, display: &DisplayState) -> bool {
        self.interactive || is_finished(display)
    }

    /// The cursor cannot move above the top row, so rows that scrolled off
    /// cannot be redrawn.
    fn fits_on_screen(&self, rows: usize) -> bool {
        self.height.map_or(true, |height| rows < height)
    }
}

#[async_trait]
impl<W: Write + Send> RenderSink for TerminalSink<W> {
    async fn post(&self, display: &DisplayState) -> Result<RenderHandle, RenderError> {
        let print = self.should_print(display);
        self.with_state(|state| {
            state.posted += 1;
            state.printed_rows = 0;
            state.overflowed = false;
            if print {
                state.printed_rows = draw(&mut state.out, display, state.width)?;
            }
            Ok(RenderHandle::new(format!("terminal-{}", state.posted)))
        })
    }

    async fn edit(&self, handle: &RenderHandle, display: &DisplayState) -> Result<(), RenderError> {
        let print = self.should_print(display);
        let interactive = self.interactive;
        let current = self.with_state(|state| Ok(format!("terminal-{}", state.posted)))?;
        if handle.id() != current {
            return Err(RenderError::Rejected {
                status: 404,
                message: format!("unknown terminal handle '{}'", handle.id()),
            });
        }
        if !print {
            return Ok(());
        }

        self.with_state(|state| {
            if interactive && !state.overflowed && !self.fits_on_screen(state.printed_rows) {
                state.overflowed = true;
            }
            if state.overflowed {
                if is_finished(display) {
                    queue!(state.out, Print("\n"))?;
                    state.printed_rows = draw(&mut state.out, display, state.width)?;
                }
                return Ok(());
            }
            if interactive && state.printed_rows > 0 {
                let rows = u16::try_from(state.printed_rows).unwrap_or(u16::MAX);
                queue!(state.out, MoveUp(rows), MoveToColumn(0))?;
            }
            if interactive {
                queue!(state.out, Clear(ClearType::FromCursorDown))?;
            }
            state.printed_rows = draw(&mut state.out, display, state.width)?;
            Ok(())
        })
    }

    async fn reply_error(&self, message: &str) -> Result<(), RenderError> {
        let mut err = io::stderr();
        queue!(
            err,
            SetForegroundColor(Color::Red),
            Print(message),
            ResetColor,
            Print("\n")
        )?;
        err.flush()?;
        Ok(())
    }
}

fn is_finished(display: &DisplayState) -> bool {
    matches!(display.tone(), Tone::Done | Tone::Error)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineStyle {
    Header(Tone),
    Author,
    SegmentName,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderedLine {
    text: String,
    style: LineStyle,
}

fn display_lines(display: &DisplayState) -> Vec<RenderedLine> {
    let mut lines = vec![RenderedLine {
        text: display.title().to_string(),
        style: LineStyle::Header(display.tone()),
    }];
    if let Some(label) = display.author_label() {
        lines.push(RenderedLine {
            text: format!("asked by {label}"),
            style: LineStyle::Author,
        });
    }
    for segment in display.segments() {
        lines.push(RenderedLine {
            text: format!("── {} ──", segment.name()),
            style: LineStyle::SegmentName,
        });
        lines.extend(segment.body().split('\n').map(|line| RenderedLine {
            text: line.trim_end_matches('\r').to_string(),
            style: LineStyle::Body,
        }));
    }
    lines
}

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Pending => Color::Yellow,
        Tone::Streaming => Color::Cyan,
        Tone::Done => Color::Green,
        Tone::Error => Color::Red,
    }
}

/// Rows `text` occupies when soft-wrapped at `width` columns.
fn visual_rows(text: &str, width: usize) -> usize {
    let width = width.max(1);
    let mut rows = 1usize;
    let mut col = 0usize;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if col + ch_width > width && col > 0 {
            rows += 1;
            col = 0;
        }
        col += ch_width;
    }
    rows
}

fn draw<W: Write>(out: &mut W, display: &DisplayState, width: usize) -> io::Result<usize> {
    let mut rows = 0usize;
    for line in display_lines(display) {
        match &line.style {
            LineStyle::Header(tone) => queue!(
                out,
                SetForegroundColor(tone_color(*tone)),
                SetAttribute(Attribute::Bold),
                Print(&line.text),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?,
            LineStyle::Author => queue!(
                out,
                SetAttribute(Attribute::Dim),
                Print(&line.text),
                SetAttribute(Attribute::Reset)
            )?,
            LineStyle::SegmentName => queue!(
                out,
                SetAttribute(Attribute::Bold),
                Print(&line.text),
                SetAttribute(Attribute::Reset)
            )?,
            LineStyle::Body => queue!(out, Print(&line.text))?,
        }
        queue!(out, Print("\n"))?;
        rows += visual_rows(&line.text, width);
    }
    out.flush()?;
    Ok(rows)
}
