use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{ChatBackend, ChatError};
use crate::conversation::{ChatSession, ConversationTurn};
use crate::pause::Pause;

/// Default number of attempts before giving up on a transient failure
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Fixed wait between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Spoken when every attempt hit a transient failure
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm unable to respond right now due to system limitations.";

/// Fixed-delay retry policy for transient chat failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// How long the model remembers the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// History is cleared at the start of every sadness episode
    Episode,
    /// One history for the whole process
    Process,
}

impl Default for MemoryScope {
    fn default() -> Self {
        Self::Episode
    }
}

/// Outcome of [`AssistantClient::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Answered(String),
    /// Every attempt failed transiently
    Exhausted { attempts: u32, fallback: String },
}

impl Reply {
    /// Text to speak back to the user
    pub fn text(&self) -> &str {
        match self {
            Self::Answered(text) => text,
            Self::Exhausted { fallback, .. } => fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Support-assistant client: bounded retry around a [`ChatBackend`] plus the
/// session history it sends along.
pub struct AssistantClient {
    backend: Box<dyn ChatBackend>,
    pause: Box<dyn Pause>,
    policy: RetryPolicy,
    memory: MemoryScope,
    session: ChatSession,
    quit: Option<Arc<AtomicBool>>,
}

impl AssistantClient {
    pub fn new(
        backend: Box<dyn ChatBackend>,
        pause: Box<dyn Pause>,
        policy: RetryPolicy,
        memory: MemoryScope,
    ) -> Self {
        Self {
            backend,
            pause,
            policy,
            memory,
            session: ChatSession::new(),
            quit: None,
        }
    }

    /// Stop retrying once this flag is set
    pub fn with_quit(mut self, quit: Arc<AtomicBool>) -> Self {
        self.quit = Some(quit);
        self
    }

    /// Called when a sadness episode starts
    pub fn begin_episode(&mut self) {
        if self.memory == MemoryScope::Episode && !self.session.is_empty() {
            debug!(
                "Clearing {} turns of chat history for new episode",
                self.session.len()
            );
            self.session.clear();
        }
    }

    /// Send one user message. Transient failures are retried with a fixed
    /// delay and end in [`Reply::Exhausted`]; any other failure is returned
    /// as an error without retrying.
    pub fn send(&mut self, user_text: &str) -> Result<Reply, ChatError> {
        let attempts = self.policy.attempts();

        for attempt in 1..=attempts {
            match self.backend.generate(self.session.turns(), user_text) {
                Ok(reply) => {
                    info!(
                        "Assistant replied on attempt {}/{} ({} chars)",
                        attempt,
                        attempts,
                        reply.len()
                    );
                    self.session.push(ConversationTurn::user(user_text));
                    self.session.push(ConversationTurn::assistant(reply.clone()));
                    return Ok(Reply::Answered(reply));
                }
                Err(ChatError::Transient(reason)) => {
                    warn!(
                        "Assistant overloaded (attempt {}/{}): {}",
                        attempt, attempts, reason
                    );
                    if self.quit_requested() {
                        info!("Quit requested, not retrying");
                        return Ok(Reply::Exhausted {
                            attempts: attempt,
                            fallback: FALLBACK_REPLY.to_string(),
                        });
                    }
                    if attempt < attempts {
                        debug!("Retrying after {:?}", self.policy.delay);
                        self.pause.pause(self.policy.delay);
                    }
                }
                Err(e) => {
                    error!("Assistant request failed: {}", e);
                    return Err(e);
                }
            }
        }

        warn!("Assistant unavailable after {} attempts, using fallback", attempts);
        Ok(Reply::Exhausted {
            attempts,
            fallback: FALLBACK_REPLY.to_string(),
        })
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    fn quit_requested(&self) -> bool {
        self.quit
            .as_ref()
            .map_or(false, |quit| quit.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Backend that replays scripted results and records what it was sent
    #[derive(Clone, Default)]
    pub struct ScriptedBackend {
        pub script: Rc<RefCell<VecDeque<Result<String, ChatError>>>>,
        pub calls: Rc<RefCell<Vec<(usize, String)>>>,
    }

    impl ScriptedBackend {
        pub fn new(script: Vec<Result<String, ChatError>>) -> Self {
            Self {
                script: Rc::new(RefCell::new(script.into())),
                calls: Rc::default(),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn generate(
            &self,
            history: &[ConversationTurn],
            user_text: &str,
        ) -> Result<String, ChatError> {
            self.calls
                .borrow_mut()
                .push((history.len(), user_text.to_string()));
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok("I'm listening.".to_string()))
        }
    }
}
