/// Operator consent: a single line of text, where only the exact token
/// `YES` counts as agreement. Empty input, EOF, and anything else refuse.
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use tokio::sync::mpsc as tokio_mpsc;

/// The only answer treated as consent.
pub const AFFIRMATIVE: &str = "YES";

pub fn is_affirmative(answer: &str) -> bool {
    answer.trim() == AFFIRMATIVE
}

/// Source of operator answers. `ask` blocks until an answer is available.
pub trait ConsentSource: Send + Sync {
    fn ask(&self, prompt: &str) -> String;
}

/// Ask on the blocking pool so the async worker is not stalled.
///
/// A panicking source counts as a refusal.
pub async fn ask(source: &Arc<dyn ConsentSource>, prompt: &str) -> String {
    let source = Arc::clone(source);
    let prompt = prompt.to_string();
    match tokio::task::spawn_blocking(move || source.ask(&prompt)).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!(error = %e, "consent prompt failed, treating as refusal");
            String::new()
        }
    }
}

/// The process's only stdin reader.
///
/// A background thread reads lines and hands each one to the pending prompt
/// if there is one, otherwise to the menu channel. The menu and consent
/// prompts therefore never race for the same line.
pub struct Console {
    pending: Mutex<Option<mpsc::SyncSender<String>>>,
    closed: AtomicBool,
    menu: Mutex<Option<tokio_mpsc::UnboundedSender<String>>>,
}

impl Console {
    /// Start reading stdin. Returns the console and the receiver for lines
    /// that no prompt claimed.
    pub fn spawn() -> (Arc<Console>, tokio_mpsc::UnboundedReceiver<String>) {
        let (console, lines) = Self::detached();
        let reader = Arc::clone(&console);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => reader.dispatch(line),
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            tracing::debug!("stdin closed");
            reader.close();
        });
        (console, lines)
    }

    /// A console with no reader attached; lines arrive through `dispatch`.
    fn detached() -> (Arc<Console>, tokio_mpsc::UnboundedReceiver<String>) {
        let (menu, lines) = tokio_mpsc::unbounded_channel();
        let console = Arc::new(Console {
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
            menu: Mutex::new(Some(menu)),
        });
        (console, lines)
    }

    fn dispatch(&self, line: String) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(prompt) => {
                let _ = prompt.send(line);
            }
            None => {
                let menu = self.menu.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(menu) = menu.as_ref() {
                    let _ = menu.send(line);
                }
            }
        }
    }

    /// Stop accepting input. A pending prompt is released with a refusal
    /// and the menu channel ends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.menu
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Print `prompt` and block until the next line arrives.
    pub fn prompt(&self, prompt: &str) -> String {
        let (tx, rx) = mpsc::sync_channel(1);
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if self.closed.load(Ordering::SeqCst) {
                return String::new();
            }
            *pending = Some(tx);
        }

        print!("{prompt}");
        let _ = std::io::stdout().flush();

        rx.recv().unwrap_or_default()
    }
}

/// Consent read from the terminal through the shared console.
pub struct TerminalConsent {
    console: Arc<Console>,
}

impl TerminalConsent {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

impl ConsentSource for TerminalConsent {
    fn ask(&self, prompt: &str) -> String {
        self.console.prompt(prompt)
    }
}

/// Replays canned answers in order, then refuses. Records every prompt.
#[cfg(test)]
pub struct ScriptedConsent {
    answers: Mutex<std::collections::VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedConsent {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ConsentSource for ScriptedConsent {
    fn ask(&self, prompt: &str) -> String {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or_default()
    }
}
