//! Webcompat: differential test harness for site interventions.
//!
//! Firefox ships per-site interventions that paper over broken sites. Each
//! intervention needs periodic re-checking: is it still required, or did the
//! site fix itself? A probe encodes that check as a declarative script and
//! runs twice on fresh browser sessions, once with the interventions enabled
//! and once without. Comparing the two outcomes yields a verdict.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐    ┌────────────┐    ┌────────────┐
//! │ Probe      │    │ Dual-Run   │    │ Firefox    │
//! │ Registry   │───►│ Engine     │───►│ (gecko-    │
//! │ (YAML)     │    │            │    │  driver)   │
//! └────────────┘    └────────────┘    └────────────┘
//!       │                 │                  │
//!   CapabilityMatcher  Classifier    WebDriver + BiDi
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod client;
mod engine;
mod environment;
mod events;
mod launcher;
mod locator;
mod matcher;
mod outcome;
mod probe;
mod registry;
mod reporter;
mod result;
mod transport;
mod wait;

/// Verdict table folding a with/without outcome pair.
pub mod classifier;

/// Step interpreter: one probe body against one live session.
pub mod executor;

/// Site-family fingerprint checks shared by probe bodies.
pub mod helpers;

/// W3C action payloads for synthesized touch and key input.
pub mod input;

pub use client::{BrowserContext, Element, FirstMatch, Session, ELEMENT_KEY};
pub use engine::{
    ActiveSession, DualRunEngine, EngineConfig, InterventionMode, LiveSessionFactory,
    ProbeCompleted, ProbeReport, SessionFactory, DEFAULT_WORKERS,
};
pub use environment::{Credential, CredentialStore, EnvironmentProfile, Platform};
pub use events::{
    BidiConnection, ConsoleListener, EventHub, NavigationListener, PromptListener, RemoteEvent,
};
pub use launcher::{
    firefox_capabilities, profile_for, BrowserLauncher, BrowserProfile, GeckodriverLauncher,
    LaunchOptions, LaunchedBrowser, ProfileBuilder, RemoteEndpointLauncher,
};
pub use locator::Locator;
pub use matcher::{CapabilityMatcher, MatchDecision};
pub use outcome::{Diagnostics, ProbeVerdict, RunOutcome, RunStatus, Verdict};
pub use probe::{
    ArmAction, Capability, CredentialField, MatchArm, Probe, ProbeBuilder, ProbeMetadata,
    ProbeParseError, RegressionBody, Step,
};
pub use registry::ProbeRegistry;
pub use reporter::{ProbeRecord, RunReport, RunSummary};
pub use result::{SkipReason, WebcompatError, WebcompatResult};
pub use transport::{
    Method, MockTransport, Transport, WebDriverTransport, WireCommand, MOCK_SESSION_ID,
};
pub use wait::{
    NavigateOptions, NavigationWait, WaitOptions, DEFAULT_NAVIGATION_TIMEOUT_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_WAIT_TIMEOUT_MS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::client::*;
    pub use super::engine::*;
    pub use super::environment::*;
    pub use super::events::*;
    pub use super::launcher::*;
    pub use super::locator::*;
    pub use super::matcher::*;
    pub use super::outcome::*;
    pub use super::probe::*;
    pub use super::registry::*;
    pub use super::reporter::*;
    pub use super::result::*;
    pub use super::transport::*;
    pub use super::wait::*;
    // Function-heavy modules stay namespaced so call sites read
    // `classifier::verdict_for` rather than a bare `verdict_for`.
    pub use super::{classifier, executor, helpers, input};
}
