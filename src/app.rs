use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::ChatError;
use crate::gemini::GeminiClient;

const MAX_INPUT_LINES: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
}

/// Busy flag for the one submission that may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
}

struct InFlight {
    token: u64,
    handle: JoinHandle<Result<String, ChatError>>,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub phase: Phase,
    pub messages: Vec<Message>,

    // Input state
    pub input: String,
    pub input_cursor: usize, // char index into input

    // Chat view state
    pub chat_scroll: u16,
    pub chat_height: u16, // set during render, used for scroll calculations
    pub chat_width: u16,  // set during render, used for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Request state. The token makes completions addressable: only the
    // completion carrying the current token may mutate the transcript.
    request_token: u64,
    in_flight: Option<InFlight>,

    client: GeminiClient,
    pub model: String,
}

impl App {
    pub fn new(client: GeminiClient, model: String) -> Self {
        Self {
            should_quit: false,
            phase: Phase::Idle,
            messages: Vec::new(),

            input: String::new(),
            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            request_token: 0,
            in_flight: None,

            client,
            model,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Sending
    }

    // --- Submission state machine -------------------------------------

    /// Pure half of `submit`: validates the input and performs the
    /// Idle -> Sending transition. Returns the token and prompt for the
    /// request to dispatch, or None when nothing should be sent (blank
    /// input, or a request already in flight).
    pub fn begin_submit(&mut self) -> Option<(u64, String)> {
        if self.phase == Phase::Sending {
            return None;
        }

        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return None;
        }

        self.input.clear();
        self.input_cursor = 0;

        self.push_message(Sender::User, prompt.clone());
        self.request_token += 1;
        self.phase = Phase::Sending;
        // Recompute so the indicator lines are scrolled into view
        self.scroll_to_bottom();

        Some((self.request_token, prompt))
    }

    /// Apply a settled request. Releases the busy indicator and appends
    /// exactly one assistant or error bubble; completions carrying a stale
    /// token are dropped without touching either.
    pub fn finish_request(&mut self, token: u64, result: Result<String, ChatError>) {
        if token != self.request_token {
            debug!(token, current = self.request_token, "dropping stale completion");
            return;
        }

        self.phase = Phase::Idle;

        match result {
            Ok(reply) => self.push_message(Sender::Assistant, reply),
            Err(err) => {
                error!(%err, "chat request failed");
                self.push_message(Sender::Assistant, err.user_message());
            }
        }
    }

    /// Submit the current input: run the state transition and spawn the
    /// network request in the background.
    pub fn submit(&mut self) {
        let Some((token, prompt)) = self.begin_submit() else {
            return;
        };

        let client = self.client.clone();
        let model = self.model.clone();
        let handle = tokio::spawn(async move { client.generate(&model, &prompt).await });

        self.in_flight = Some(InFlight { token, handle });
    }

    /// Check the in-flight request without blocking; apply its result once
    /// the task has settled. Called from the event loop, so the tick event
    /// guarantees completions land even while the keyboard is idle.
    pub async fn poll_response(&mut self) {
        let Some(request) = self.in_flight.take() else {
            return;
        };

        if !request.handle.is_finished() {
            self.in_flight = Some(request);
            return;
        }

        let result = match request.handle.await {
            Ok(result) => result,
            // A panicked request task still has to release the indicator.
            Err(err) => Err(ChatError::Transport(err.to_string())),
        };

        self.finish_request(request.token, result);
    }

    pub fn push_message(&mut self, sender: Sender, text: String) {
        self.messages.push(Message { sender, text });
        self.scroll_to_bottom();
    }

    // --- Input editing -------------------------------------------------

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert(byte_pos, c);
        self.input_cursor += 1;
    }

    /// Insert a literal line break (modifier-held Enter).
    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn delete_before_cursor(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete_at_cursor(&mut self) {
        let char_count = self.input.chars().count();
        if self.input_cursor < char_count {
            let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.input.chars().count();
        self.input_cursor = (self.input_cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }

    /// Height of the input box in text rows: grows with the number of
    /// buffer lines, up to a cap. Presentation only.
    pub fn input_height(&self) -> u16 {
        (self.input.split('\n').count() as u16).clamp(1, MAX_INPUT_LINES)
    }

    /// Cursor position as (row, column) within the input buffer, in chars.
    pub fn input_cursor_position(&self) -> (u16, u16) {
        let mut row = 0u16;
        let mut col = 0u16;
        for (i, c) in self.input.chars().enumerate() {
            if i == self.input_cursor {
                break;
            }
            if c == '\n' {
                row += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        (row, col)
    }

    // --- Chat scrolling -------------------------------------------------

    /// Total rendered chat lines at the given wrap width: a role label per
    /// message, its wrapped content lines, a blank separator, and the busy
    /// indicator tail while a request is outstanding.
    pub fn total_chat_lines(&self, width: u16) -> u16 {
        let wrap_width = width.max(1) as usize;
        let mut total: u16 = 0;

        for msg in &self.messages {
            total += 1; // role label line
            for line in msg.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total += 1; // Empty line still takes one line
                } else {
                    total += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total += 1; // Blank line after message
        }

        if self.is_busy() {
            total += 2; // label + "Thinking..."
        }

        total
    }

    fn max_chat_scroll(&self) -> u16 {
        // Fall back to plausible dimensions before the first render
        let width = if self.chat_width > 0 { self.chat_width } else { 50 };
        let height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.total_chat_lines(width).saturating_sub(height)
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.chat_scroll < self.max_chat_scroll() {
            self.chat_scroll = self.chat_scroll.saturating_add(1);
        }
    }

    pub fn scroll_half_page_up(&mut self) {
        let half_page = self.chat_height / 2;
        self.chat_scroll = self.chat_scroll.saturating_sub(half_page);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half_page = self.chat_height / 2;
        self.chat_scroll = (self.chat_scroll + half_page).min(self.max_chat_scroll());
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_app() -> App {
        App::new(GeminiClient::new("test-key"), "gemini-2.0-flash".to_string())
    }

    fn set_input(app: &mut App, text: &str) {
        app.input = text.to_string();
        app.input_cursor = text.chars().count();
    }

    #[test]
    fn empty_input_does_not_submit() {
        let mut app = test_app();
        assert!(app.begin_submit().is_none());
        assert!(app.messages.is_empty());
        assert_eq!(app.phase, Phase::Idle);
    }

    #[test]
    fn whitespace_input_does_not_submit() {
        let mut app = test_app();
        set_input(&mut app, "  \n  ");
        assert!(app.begin_submit().is_none());
        assert!(app.messages.is_empty());
        assert_eq!(app.phase, Phase::Idle);
    }

    #[test]
    fn submit_appends_user_message_and_enters_sending() {
        let mut app = test_app();
        set_input(&mut app, "  hello  ");

        let (token, prompt) = app.begin_submit().unwrap();

        assert_eq!(token, 1);
        assert_eq!(prompt, "hello");
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.messages[0].sender, Sender::User);
        assert_eq!(app.messages[0].text, "hello");
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
        assert_eq!(app.phase, Phase::Sending);
    }

    #[test]
    fn submission_while_sending_is_ignored() {
        let mut app = test_app();
        set_input(&mut app, "first");
        app.begin_submit().unwrap();

        set_input(&mut app, "second");
        assert!(app.begin_submit().is_none());
        assert_eq!(app.messages.len(), 1);
        // The pending prompt stays in the input box
        assert_eq!(app.input, "second");
    }

    #[test]
    fn success_appends_assistant_message_and_returns_idle() {
        let mut app = test_app();
        set_input(&mut app, "hello");
        let (token, _) = app.begin_submit().unwrap();

        app.finish_request(token, Ok("Hi".to_string()));

        assert_eq!(app.phase, Phase::Idle);
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].sender, Sender::Assistant);
        assert_eq!(app.messages[1].text, "Hi");
    }

    #[test]
    fn remote_error_appends_bubble_with_status_and_message() {
        let mut app = test_app();
        set_input(&mut app, "hello");
        let (token, _) = app.begin_submit().unwrap();

        app.finish_request(
            token,
            Err(ChatError::Remote {
                status: 403,
                message: "bad key".to_string(),
            }),
        );

        assert_eq!(app.phase, Phase::Idle);
        assert_eq!(app.messages.len(), 2);
        assert!(app.messages[1].text.contains("403"));
        assert!(app.messages[1].text.contains("bad key"));
    }

    #[test]
    fn empty_response_appends_fallback_bubble() {
        let mut app = test_app();
        set_input(&mut app, "hello");
        let (token, _) = app.begin_submit().unwrap();

        app.finish_request(token, Err(ChatError::EmptyResponse));

        assert_eq!(app.phase, Phase::Idle);
        assert_eq!(
            app.messages[1].text,
            "Sorry, I could not generate a response. Please try again."
        );
    }

    #[test]
    fn transport_error_appends_bubble_with_hint() {
        let mut app = test_app();
        set_input(&mut app, "hello");
        let (token, _) = app.begin_submit().unwrap();

        app.finish_request(token, Err(ChatError::Transport("network down".to_string())));

        assert_eq!(app.phase, Phase::Idle);
        assert!(app.messages[1].text.contains("network down"));
        assert!(app.messages[1].text.contains("API key"));
    }

    #[test]
    fn stale_completion_is_dropped() {
        let mut app = test_app();
        set_input(&mut app, "hello");
        let (token, _) = app.begin_submit().unwrap();

        app.finish_request(token - 1, Ok("late".to_string()));

        // Still waiting on the current request
        assert_eq!(app.phase, Phase::Sending);
        assert_eq!(app.messages.len(), 1);
    }

    #[test]
    fn settled_submission_appends_exactly_one_message_pair() {
        let mut app = test_app();
        for round in 0..3 {
            set_input(&mut app, "ping");
            let (token, _) = app.begin_submit().unwrap();
            app.finish_request(token, Ok("pong".to_string()));
            assert_eq!(app.messages.len(), (round + 1) * 2);
        }
    }

    #[tokio::test]
    async fn submit_and_poll_settle_through_the_task() {
        let client = GeminiClient::with_base_url("test-key", "http://127.0.0.1:9");
        let mut app = App::new(client, "gemini-2.0-flash".to_string());
        set_input(&mut app, "hello");

        app.submit();
        assert_eq!(app.phase, Phase::Sending);

        while app.phase == Phase::Sending {
            app.poll_response().await;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(app.messages.len(), 2);
        assert!(app.messages[1].text.contains("API key"));
    }

    #[test]
    fn editing_is_utf8_safe() {
        let mut app = test_app();
        app.insert_char('é');
        app.insert_char('b');
        app.cursor_left();
        app.insert_char('a');
        assert_eq!(app.input, "éab");

        app.delete_before_cursor();
        assert_eq!(app.input, "éb");

        app.cursor_home();
        app.delete_at_cursor();
        assert_eq!(app.input, "b");
    }

    #[test]
    fn newline_insertion_grows_the_input_box() {
        let mut app = test_app();
        assert_eq!(app.input_height(), 1);

        set_input(&mut app, "a");
        app.insert_newline();
        app.insert_char('b');
        assert_eq!(app.input, "a\nb");
        assert_eq!(app.input_height(), 2);
        assert_eq!(app.input_cursor_position(), (1, 1));

        for _ in 0..10 {
            app.insert_newline();
        }
        assert_eq!(app.input_height(), MAX_INPUT_LINES);
    }

    #[test]
    fn animation_only_advances_while_sending() {
        let mut app = test_app();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        set_input(&mut app, "hello");
        app.begin_submit().unwrap();
        app.tick_animation();
        assert_eq!(app.animation_frame, 1);
    }

    #[test]
    fn chat_line_count_splits_on_newlines_and_wraps() {
        let mut app = test_app();
        app.push_message(Sender::User, "a\nb".to_string());

        // label + two content lines + blank
        assert_eq!(app.total_chat_lines(50), 4);

        app.phase = Phase::Sending;
        assert_eq!(app.total_chat_lines(50), 6);
    }
}
