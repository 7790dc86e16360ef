//! Prove pipeline
//!
//! `ProveSession` drives an opaque [`Prover`] through one proof: open a
//! session with the verifier, send the request, fetch both transcripts,
//! turn the plugin's handlers into reveal ranges and reveal only those.
//! The prover session is always released, also on failure.

use crate::config::ProveConfig;
use crate::reveal::{process_handlers, Handler, ProcessedRanges};
use crate::transcript::HttpMessage;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The HTTP request a plugin asks to prove
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Verifier, proxy and reveal settings for one proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProverOptions {
    pub verifier_url: String,
    /// Derived from the verifier when the plugin omits it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_recv_data: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sent_data: Option<u64>,
    #[serde(default)]
    pub handlers: Vec<Handler>,
}

impl ProverOptions {
    /// Fill omitted limits from the host defaults
    pub fn with_defaults(mut self, defaults: &ProveConfig) -> Self {
        self.max_sent_data.get_or_insert(defaults.max_sent_data);
        self.max_recv_data.get_or_insert(defaults.max_recv_data);
        self
    }
}

/// Raw bytes of both transcript directions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub sent: Vec<u8>,
    pub recv: Vec<u8>,
}

/// Stages reported while a proof is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProveProgress {
    Connecting,
    MpcSetup,
    SendingRequest,
    ProcessingTranscript,
    SendingRevealConfig,
    GeneratingProof,
    WaitingForVerification,
    Complete,
}

impl fmt::Display for ProveProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "CONNECTING",
            Self::MpcSetup => "MPC_SETUP",
            Self::SendingRequest => "SENDING_REQUEST",
            Self::ProcessingTranscript => "PROCESSING_TRANSCRIPT",
            Self::SendingRevealConfig => "SENDING_REVEAL_CONFIG",
            Self::GeneratingProof => "GENERATING_PROOF",
            Self::WaitingForVerification => "WAITING_FOR_VERIFICATION",
            Self::Complete => "COMPLETE",
        };
        f.write_str(s)
    }
}

/// The TLS prover (MPC-TLS implementation) behind the pipeline
#[async_trait(?Send)]
pub trait Prover {
    /// Open a prover session with the verifier; returns the session id
    async fn create(
        &self,
        verifier_url: &str,
        proxy_url: &str,
        max_sent_data: u64,
        max_recv_data: u64,
    ) -> anyhow::Result<String>;

    async fn send_request(&self, session: &str, request: &RequestOptions) -> anyhow::Result<()>;

    async fn transcript(&self, session: &str) -> anyhow::Result<Transcript>;

    /// Tell the verifier which ranges will be revealed
    async fn send_reveal_config(&self, session: &str, ranges: &ProcessedRanges) -> anyhow::Result<()>;

    async fn generate_proof(&self, session: &str) -> anyhow::Result<()>;

    /// Wait for the verifier to check the proof and return its result
    async fn await_verification(&self, session: &str) -> anyhow::Result<Value>;

    /// Release the session; never fails
    async fn cleanup(&self, session: &str);
}

type ProgressCallback<'a> = Box<dyn Fn(ProveProgress) + 'a>;

pub struct ProveSession<'a, P: Prover + ?Sized> {
    prover: &'a P,
    defaults: ProveConfig,
    on_progress: Option<ProgressCallback<'a>>,
}

impl<'a, P: Prover + ?Sized> ProveSession<'a, P> {
    pub fn new(prover: &'a P, defaults: ProveConfig) -> Self {
        Self {
            prover,
            defaults,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: impl Fn(ProveProgress) + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    fn progress(&self, step: ProveProgress) {
        tracing::debug!("[prove] {}", step);
        if let Some(cb) = &self.on_progress {
            cb(step);
        }
    }

    /// Run one proof. `options.proxy_url` must already be resolved.
    pub async fn run(&self, request: &RequestOptions, options: &ProverOptions) -> anyhow::Result<Value> {
        let options = options.clone().with_defaults(&self.defaults);
        let proxy_url = options
            .proxy_url
            .as_deref()
            .context("Prover options have no proxy URL")?;

        self.progress(ProveProgress::Connecting);
        let session = self
            .prover
            .create(
                &options.verifier_url,
                proxy_url,
                options.max_sent_data.unwrap_or(self.defaults.max_sent_data),
                options.max_recv_data.unwrap_or(self.defaults.max_recv_data),
            )
            .await
            .with_context(|| format!("Failed to create prover session with {}", options.verifier_url))?;
        self.progress(ProveProgress::MpcSetup);

        let result = self.run_session(&session, request, &options.handlers).await;
        self.prover.cleanup(&session).await;

        if result.is_ok() {
            self.progress(ProveProgress::Complete);
        }
        result
    }

    async fn run_session(&self, session: &str, request: &RequestOptions, handlers: &[Handler]) -> anyhow::Result<Value> {
        self.progress(ProveProgress::SendingRequest);
        self.prover
            .send_request(session, request)
            .await
            .with_context(|| format!("Failed to send {} {}", request.method, request.url))?;

        self.progress(ProveProgress::ProcessingTranscript);
        let transcript = self.prover.transcript(session).await.context("Failed to read transcript")?;
        let sent = HttpMessage::parse(transcript.sent).context("Failed to parse sent transcript")?;
        let recv = HttpMessage::parse(transcript.recv).context("Failed to parse received transcript")?;
        let ranges = process_handlers(handlers, &sent, &recv)?;
        tracing::debug!(
            "[prove] revealing {} sent and {} received ranges",
            ranges.sent_ranges.len(),
            ranges.recv_ranges.len()
        );

        self.progress(ProveProgress::SendingRevealConfig);
        self.prover
            .send_reveal_config(session, &ranges)
            .await
            .context("Failed to send reveal config")?;

        self.progress(ProveProgress::GeneratingProof);
        self.prover.generate_proof(session).await.context("Proof generation failed")?;

        self.progress(ProveProgress::WaitingForVerification);
        self.prover.await_verification(session).await.context("Verification failed")
    }
}
