use crate::render::{DisplayState, PresentationBuilder, RenderHandle, RenderSink};
use crate::types::StreamEvent;
use crate::util::{char_len, char_prefix};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Delay between reveal ticks.
    pub char_rate: Duration,
    pub chars_per_tick: usize,
    /// Silence after which the consumer finalizes with what it has.
    pub stall_timeout: Duration,
    /// Extra pause before revealing a prefix that ends on punctuation.
    pub punctuation_pause: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            char_rate: Duration::from_millis(750),
            chars_per_tick: 90,
            stall_timeout: Duration::from_secs(45),
            punctuation_pause: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerPhase {
    Waiting,
    Streaming,
    Finalizing,
    Done,
    /// The render sink failed unrecoverably.
    Error,
}

#[derive(Debug, Clone)]
pub struct ConsumerOutcome {
    /// Everything the producer delivered, untruncated.
    pub text: String,
    /// Chars of `text` revealed by the last partial render.
    pub revealed: usize,
    pub stalled: bool,
    pub upstream_error: Option<String>,
    /// An `End` or `Error` event was received.
    pub terminal_seen: bool,
    pub phase: ConsumerPhase,
    /// Last display handed to the sink.
    pub display: DisplayState,
}

/// Drains the transfer channel and reveals the accumulated answer at a
/// bounded cadence through partial edits of one render handle.
pub struct DisplayConsumer<'a> {
    sink: &'a dyn RenderSink,
    handle: &'a RenderHandle,
    builder: &'a PresentationBuilder,
    pacing: PacingConfig,
}

struct Accumulator {
    text: String,
    chars: usize,
    done: bool,
    terminal_seen: bool,
    upstream_error: Option<String>,
}

impl<'a> DisplayConsumer<'a> {
    pub fn new(
        sink: &'a dyn RenderSink,
        handle: &'a RenderHandle,
        builder: &'a PresentationBuilder,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            sink,
            handle,
            builder,
            pacing,
        }
    }

    pub async fn run(
        self,
        mut rx: mpsc::Receiver<StreamEvent>,
        initial: DisplayState,
    ) -> ConsumerOutcome {
        let answer_limit = self.builder.limits().answer_limit;
        let chars_per_tick = self.pacing.chars_per_tick.max(1);

        let mut acc = Accumulator {
            text: String::new(),
            chars: 0,
            done: false,
            terminal_seen: false,
            upstream_error: None,
        };
        let mut display = initial;
        let mut shown = 0usize;
        let mut stalled = false;
        let mut phase = ConsumerPhase::Waiting;
        let mut last_progress = Instant::now();

        loop {
            let progressed = drain(&mut rx, &mut acc);
            if progressed {
                last_progress = Instant::now();
                if phase == ConsumerPhase::Waiting {
                    phase = transition(phase, ConsumerPhase::Streaming);
                }
            } else if !acc.done && last_progress.elapsed() > self.pacing.stall_timeout {
                warn!(
                    accumulated = acc.chars,
                    timeout = ?self.pacing.stall_timeout,
                    "no delta within stall timeout, finalizing with partial text"
                );
                acc.done = true;
                stalled = true;
            }
            if acc.done && matches!(phase, ConsumerPhase::Waiting | ConsumerPhase::Streaming) {
                phase = transition(phase, ConsumerPhase::Finalizing);
            }

            let reveal_limit = acc.chars.min(answer_limit);
            let target = reveal_limit.min(shown + chars_per_tick);
            if target > shown {
                let prefix = char_prefix(&acc.text, target);
                if target < reveal_limit && ends_with_pause_char(prefix) {
                    sleep(self.pacing.punctuation_pause).await;
                }

                let next = self.builder.with_partial(&display, prefix, !acc.done);
                match self.sink.edit(self.handle, &next).await {
                    Ok(()) => {}
                    Err(error) if error.is_fatal() => {
                        warn!(%error, shown, "render sink rejected partial edit, abandoning stream");
                        phase = transition(phase, ConsumerPhase::Error);
                        return outcome(acc, shown, stalled, phase, display);
                    }
                    Err(error) => {
                        debug!(%error, shown, target, "partial render failed, continuing");
                    }
                }
                display = next;
                shown = target;
            }

            if acc.done && shown >= reveal_limit {
                phase = transition(phase, ConsumerPhase::Done);
                return outcome(acc, shown, stalled, phase, display);
            }

            sleep(self.pacing.char_rate).await;
        }
    }
}

/// Pull every queued event without waiting. Returns true when text arrived.
fn drain(rx: &mut mpsc::Receiver<StreamEvent>, acc: &mut Accumulator) -> bool {
    let mut progressed = false;
    while !acc.done {
        match rx.try_recv() {
            Ok(StreamEvent::Delta(text)) => {
                acc.chars += char_len(&text);
                acc.text.push_str(&text);
                progressed = true;
            }
            Ok(StreamEvent::End) => {
                acc.done = true;
                acc.terminal_seen = true;
            }
            Ok(StreamEvent::Error(message)) => {
                acc.done = true;
                acc.terminal_seen = true;
                acc.upstream_error = Some(message);
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                acc.done = true;
                acc.terminal_seen = true;
                acc.upstream_error = Some("producer exited without a terminal event".to_string());
            }
        }
    }
    progressed
}

fn transition(from: ConsumerPhase, to: ConsumerPhase) -> ConsumerPhase {
    debug!(?from, ?to, "consumer phase change");
    to
}

fn ends_with_pause_char(prefix: &str) -> bool {
    matches!(
        prefix.chars().next_back(),
        Some('.' | ',' | ';' | ':' | '!' | '?' | '。' | '，' | '！' | '？')
    )
}

fn outcome(
    acc: Accumulator,
    revealed: usize,
    stalled: bool,
    phase: ConsumerPhase,
    display: DisplayState,
) -> ConsumerOutcome {
    ConsumerOutcome {
        text: acc.text,
        revealed,
        stalled,
        upstream_error: acc.upstream_error,
        terminal_seen: acc.terminal_seen,
        phase,
        display,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::presentation::CURSOR_GLYPH;
    use crate::render::{RenderLimits, Tone};
    use crate::test_support::{RecordingSink, SinkCall};
    use crate::types::AskerIdentity;

    fn pacing(chars_per_tick: usize) -> PacingConfig {
        PacingConfig {
            char_rate: Duration::from_millis(100),
            chars_per_tick,
            stall_timeout: Duration::from_secs(5),
            punctuation_pause: Duration::from_millis(30),
        }
    }

    async fn run_consumer(
        sink: &RecordingSink,
        limits: RenderLimits,
        pacing: PacingConfig,
        rx: mpsc::Receiver<StreamEvent>,
    ) -> ConsumerOutcome {
        let builder = PresentationBuilder::new(limits);
        let initial = builder.build_initial("question", &AskerIdentity::new("ada", None));
        let handle = sink.post(&initial).await.unwrap();
        DisplayConsumer::new(sink, &handle, &builder, pacing)
            .run(rx, initial)
            .await
    }

    fn partial_answers(sink: &RecordingSink) -> Vec<String> {
        sink.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Edit(display) => Some(display.answer_text()),
                _ => None,
            })
            .collect()
    }

    async fn feed(events: Vec<StreamEvent>) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveals_whole_answer_in_one_tick() {
        let rx = feed(vec![
            StreamEvent::Delta("Hel".to_string()),
            StreamEvent::Delta("lo ".to_string()),
            StreamEvent::Delta("world".to_string()),
            StreamEvent::End,
        ])
        .await;
        let sink = RecordingSink::default();
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(100), rx).await;

        assert_eq!(outcome.text, "Hello world");
        assert_eq!(outcome.revealed, 11);
        assert_eq!(outcome.phase, ConsumerPhase::Done);
        assert_eq!(partial_answers(&sink), vec!["Hello world".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_is_paced_and_monotonic() {
        let text = "abcdefghij".repeat(5);
        let rx = feed(vec![StreamEvent::Delta(text.clone()), StreamEvent::End]).await;
        let sink = RecordingSink::default();
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(8), rx).await;

        let answers = partial_answers(&sink);
        assert_eq!(answers.len(), 7);
        let lengths: Vec<usize> = answers.iter().map(|a| char_len(a)).collect();
        assert!(lengths.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(answers.last(), Some(&text));
        assert_eq!(outcome.revealed, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_shown_while_stream_is_open() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Delta("Hi".to_string())).await.unwrap();
        let sink = RecordingSink::default();
        let builder = PresentationBuilder::new(RenderLimits::default());
        let initial = builder.build_initial("q", &AskerIdentity::default());
        let handle = sink.post(&initial).await.unwrap();

        let consumer = DisplayConsumer::new(&sink, &handle, &builder, pacing(10));
        let run = consumer.run(rx, initial);
        let finish = async {
            sleep(Duration::from_millis(350)).await;
            tx.send(StreamEvent::Delta(" there".to_string())).await.unwrap();
            tx.send(StreamEvent::End).await.unwrap();
        };
        let (outcome, ()) = tokio::join!(run, finish);

        let answers = partial_answers(&sink);
        assert_eq!(answers.first().map(String::as_str), Some(format!("Hi{CURSOR_GLYPH}").as_str()));
        assert_eq!(answers.last().map(String::as_str), Some("Hi there"));
        assert_eq!(outcome.text, "Hi there");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_answer_returns_empty_text() {
        let rx = feed(vec![StreamEvent::End]).await;
        let sink = RecordingSink::default();
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(10), rx).await;
        assert_eq!(outcome.text, "");
        assert!(outcome.terminal_seen);
        assert!(partial_answers(&sink).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_finalizes_with_partial_text() {
        let rx = feed(vec![
            StreamEvent::Delta("partial".to_string()),
            StreamEvent::Error("connection reset".to_string()),
        ])
        .await;
        let sink = RecordingSink::default();
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(100), rx).await;
        assert_eq!(outcome.text, "partial");
        assert_eq!(outcome.upstream_error.as_deref(), Some("connection reset"));
        assert!(!outcome.stalled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_watchdog_finalizes_accumulated_text() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Delta("partial".to_string())).await.unwrap();
        let sink = RecordingSink::default();
        let started = Instant::now();
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(100), rx).await;

        assert!(outcome.stalled);
        assert!(!outcome.terminal_seen);
        assert_eq!(outcome.text, "partial");
        assert!(started.elapsed() > Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        // The watchdog adds no render of its own; the final edit drops the cursor.
        assert_eq!(
            partial_answers(&sink).last().cloned(),
            Some(format!("partial{CURSOR_GLYPH}"))
        );
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_render_failures_are_swallowed() {
        let rx = feed(vec![StreamEvent::Delta("x".repeat(30)), StreamEvent::End]).await;
        let sink = RecordingSink::default();
        sink.fail_next_edits(2);
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(10), rx).await;
        assert_eq!(outcome.phase, ConsumerPhase::Done);
        assert_eq!(outcome.revealed, 30);
        assert_eq!(partial_answers(&sink), vec!["x".repeat(30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_render_failure_abandons_stream() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Delta("hello".to_string())).await.unwrap();
        let sink = RecordingSink::default();
        sink.reject_edits();
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(10), rx).await;
        assert_eq!(outcome.phase, ConsumerPhase::Error);
        assert_eq!(outcome.revealed, 0);
        assert_eq!(outcome.display.tone(), Tone::Pending);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_stops_at_answer_limit() {
        let rx = feed(vec![StreamEvent::Delta("0123456789ABC".to_string()), StreamEvent::End]).await;
        let sink = RecordingSink::default();
        let limits = RenderLimits {
            field_limit: 1024,
            answer_limit: 10,
        };
        let outcome = run_consumer(&sink, limits, pacing(4), rx).await;
        assert_eq!(outcome.revealed, 10);
        assert_eq!(outcome.text, "0123456789ABC");
        assert_eq!(
            partial_answers(&sink).last().cloned(),
            Some("0123456789".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_terminal_event_counts_as_error() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Delta("half".to_string())).await.unwrap();
        drop(tx);
        let sink = RecordingSink::default();
        let outcome = run_consumer(&sink, RenderLimits::default(), pacing(10), rx).await;
        assert_eq!(outcome.text, "half");
        assert!(outcome.upstream_error.is_some());
    }

    #[test]
    fn test_pause_chars() {
        assert!(ends_with_pause_char("Hello,"));
        assert!(ends_with_pause_char("Done."));
        assert!(!ends_with_pause_char("word"));
        assert!(!ends_with_pause_char(""));
    }
}
