//! Launch readiness detection.
//!
//! The CLI reports that a target became debuggable only through free-text
//! lines mixed into its regular log output, and a platform may need several
//! such lines in no particular order. [`ReadinessDetector`] folds that
//! stream into a single resolution:
//!
//! ```text
//! Waiting ──all phrases seen──▶ Ready
//!    │
//!    └──────process exit──────▶ Failed
//! ```
//!
//! Both terminal states ignore everything that follows.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LaunchError;
use crate::output::{OutputChannel, OutputLevel};
use crate::process::{ProcessEvent, ProcessHandle, SPAWN_FAILED_EXIT_CODE};

type LinePredicate = dyn Fn(&str) -> bool + Send + Sync;

/// A named predicate over a single output line.
#[derive(Clone)]
pub struct Phrase {
    name: String,
    predicate: Arc<LinePredicate>,
}

impl Phrase {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Satisfied by any line containing `text`.
    pub fn contains(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(name, move |line: &str| line.contains(text.as_str()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, line: &str) -> bool {
        (self.predicate)(line)
    }
}

impl fmt::Debug for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phrase").field("name", &self.name).finish()
    }
}

/// Required phrases plus the delay applied once they have all been seen.
#[derive(Debug, Clone)]
pub struct ReadinessProfile {
    phrases: Vec<Phrase>,
    post_ready_delay: Duration,
}

impl ReadinessProfile {
    pub fn new(phrases: Vec<Phrase>, post_ready_delay: Duration) -> Self {
        debug_assert!(!phrases.is_empty(), "readiness needs at least one phrase");
        Self {
            phrases,
            post_ready_delay,
        }
    }

    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    pub fn post_ready_delay(&self) -> Duration {
        self.post_ready_delay
    }
}

/// Phase of a [`ReadinessDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Waiting,
    Ready,
    Failed,
}

/// Result of feeding one observation to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still waiting for more phrases.
    Pending,
    /// Became ready just now; resolve after `delay`.
    Ready { delay: Duration },
    /// Became failed just now.
    Failed { exit_code: i32 },
    /// Already resolved; the observation has no effect.
    Ignored,
}

/// Which phrases have been seen, plus the double-resolution guard.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadinessState {
    satisfied: Vec<bool>,
    resolved: bool,
}

/// Folds output lines and the exit event into one readiness decision.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    profile: ReadinessProfile,
    state: ReadinessState,
    phase: DetectorState,
}

impl ReadinessDetector {
    pub fn new(profile: ReadinessProfile) -> Self {
        let state = ReadinessState {
            satisfied: vec![false; profile.phrases.len()],
            resolved: false,
        };
        Self {
            profile,
            state,
            phase: DetectorState::Waiting,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.phase
    }

    /// Names of the phrases seen so far.
    pub fn satisfied(&self) -> Vec<&str> {
        self.profile
            .phrases
            .iter()
            .zip(&self.state.satisfied)
            .filter(|(_, seen)| **seen)
            .map(|(phrase, _)| phrase.name())
            .collect()
    }

    /// Feed one stdout line.
    pub fn observe_line(&mut self, line: &str) -> Transition {
        if self.state.resolved {
            return Transition::Ignored;
        }

        for (phrase, seen) in self
            .profile
            .phrases
            .iter()
            .zip(self.state.satisfied.iter_mut())
        {
            if !*seen && phrase.matches(line) {
                tracing::debug!(phrase = phrase.name(), "readiness phrase observed");
                *seen = true;
            }
        }

        if self.state.satisfied.iter().all(|seen| *seen) {
            self.state.resolved = true;
            self.phase = DetectorState::Ready;
            Transition::Ready {
                delay: self.profile.post_ready_delay,
            }
        } else {
            Transition::Pending
        }
    }

    /// Feed the process exit. Fails the launch when still waiting,
    /// whatever the exit code.
    pub fn observe_exit(&mut self, exit_code: i32) -> Transition {
        if self.state.resolved {
            return Transition::Ignored;
        }
        self.state.resolved = true;
        self.phase = DetectorState::Failed;
        Transition::Failed { exit_code }
    }
}

/// Drive `detector` from `process` until it resolves.
///
/// Every line is republished on `output` (`log` for stdout, `error` for
/// stderr). Only stdout feeds the detector; stderr never fails a launch.
/// On `Ready` the profile's delay is slept before returning.
///
/// # Errors
///
/// [`LaunchError::ExitedUnexpectedly`] if the process exits first.
pub async fn await_readiness(
    process: &mut ProcessHandle,
    detector: &mut ReadinessDetector,
    output: &OutputChannel,
) -> Result<(), LaunchError> {
    loop {
        let transition = match process.next_event().await {
            Some(ProcessEvent::Stdout(line)) => {
                let transition = detector.observe_line(&line);
                output.emit(line, OutputLevel::Log);
                transition
            }
            Some(ProcessEvent::Stderr(line)) => {
                output.emit(line, OutputLevel::Error);
                Transition::Pending
            }
            Some(ProcessEvent::Exited { code }) => detector.observe_exit(code),
            None => detector.observe_exit(SPAWN_FAILED_EXIT_CODE),
        };

        match transition {
            Transition::Ready { delay } => {
                if !delay.is_zero() {
                    tracing::debug!(?delay, "readiness reached, waiting for transport");
                    tokio::time::sleep(delay).await;
                }
                return Ok(());
            }
            Transition::Failed { exit_code } => {
                tracing::warn!(
                    exit_code,
                    satisfied = ?detector.satisfied(),
                    "CLI exited before the target became debuggable"
                );
                return Err(LaunchError::ExitedUnexpectedly { exit_code });
            }
            Transition::Pending | Transition::Ignored => {}
        }
    }
}
