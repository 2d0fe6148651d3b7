//! Scripted sources and recording transports for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::alerting::{DeliveryError, MessagingTransport};
use crate::models::RateSample;
use crate::rate::{FetchError, RateSource};

/// Rate source replaying a script of readings.
///
/// `None` entries fail the fetch. Once the script runs out the fallback
/// (if any) is returned forever.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<Decimal>>>,
    fallback: Option<Decimal>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn fixed(value: Decimal) -> Arc<Self> {
        Arc::new(Self::build(Vec::new(), Some(value)))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::build(Vec::new(), None))
    }

    pub fn sequence(script: Vec<Option<Decimal>>) -> Arc<Self> {
        Arc::new(Self::build(script, None))
    }

    /// Delay every fetch; only usable on a fresh handle
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let inner = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("source already shared"));
        Arc::new(Self {
            delay: Some(delay),
            ..inner
        })
    }

    fn build(script: Vec<Option<Decimal>>, fallback: Option<Decimal>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of fetches started
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for ScriptedSource {
    async fn fetch(&self) -> Result<RateSample, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front().unwrap_or(self.fallback);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        next.map(RateSample::new)
            .ok_or_else(|| FetchError::Http("scripted failure".to_string()))
    }
}

/// One recorded send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub kind: &'static str,
    pub target: Option<String>,
    pub text: String,
}

/// Transport that records every send, optionally failing each one
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// Successful sends
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// All sends, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record(
        &self,
        kind: &'static str,
        target: Option<&str>,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DeliveryError::Transport("connection refused".to_string()));
        }
        self.sent.lock().push(Sent {
            kind,
            target: target.map(str::to_string),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn push_to_recipient(&self, recipient: &str, text: &str) -> Result<(), DeliveryError> {
        self.record("push", Some(recipient), text)
    }

    async fn broadcast(&self, text: &str) -> Result<(), DeliveryError> {
        self.record("broadcast", None, text)
    }

    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), DeliveryError> {
        self.record("reply", Some(reply_token), text)
    }
}
