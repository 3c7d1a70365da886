//! Decomposition and extraction entry points.
//!
//! Decomposition splits the raw input into URL tokens, validates all of
//! them up front, then routes every token concurrently. Results are written
//! back by input index so the flattened output keeps the input order.

use crate::config::ScrapingConfig;
use crate::error::SourceError;
use crate::sources::{EpisodeRef, Fetcher, NovelRecord, RequestContext, SiteRouter};
use crate::utils::InputUrl;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Raw decomposition input: URLs separated by ASCII whitespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecomposeRequest {
    pub url_string: String,
}

/// Episodes of every input URL, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposeResponse {
    pub novel_url_list: Vec<EpisodeRef>,
}

/// A single episode URL to extract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
}

/// An input URL that failed in lenient decomposition.
#[derive(Debug)]
pub struct FailedUrl {
    pub url: String,
    pub error: SourceError,
}

/// Outcome of lenient decomposition.
#[derive(Debug, Default)]
pub struct PartialDecomposition {
    /// Episodes of the inputs that succeeded, in input order.
    pub succeeded: Vec<EpisodeRef>,
    /// Inputs that failed, in input order.
    pub failed: Vec<FailedUrl>,
}

type TokenResult = Result<Vec<EpisodeRef>, SourceError>;

/// Splits raw input on ASCII whitespace (spaces, tabs, newlines) and parses
/// every token.
///
/// Any malformed token fails the whole input before anything is fetched.
pub fn split_input(url_string: &str) -> Result<Vec<InputUrl>, SourceError> {
    url_string
        .split_ascii_whitespace()
        .map(InputUrl::parse)
        .collect()
}

/// Front end tying the router to concurrency limits.
pub struct Pipeline {
    router: Arc<SiteRouter>,
    max_concurrent: usize,
}

impl Pipeline {
    pub fn new(router: SiteRouter, max_concurrent: usize) -> Self {
        Self {
            router: Arc::new(router),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Creates a pipeline with every built-in adapter on the real network.
    pub fn from_config(config: &ScrapingConfig) -> Result<Self, reqwest::Error> {
        let fetcher = Fetcher::from_config(config)?;
        Ok(Self::new(
            SiteRouter::new(fetcher),
            config.max_concurrent_requests,
        ))
    }

    pub fn router(&self) -> &SiteRouter {
        &self.router
    }

    /// Decomposes every URL of the request.
    ///
    /// All or nothing: the first failure cancels the remaining work and the
    /// error of the lowest failing input index is returned.
    pub async fn decompose(
        &self,
        request: &DecomposeRequest,
        ctx: &RequestContext,
    ) -> Result<DecomposeResponse, SourceError> {
        let inputs = split_input(&request.url_string)?;
        let results = self.run(inputs, ctx, true).await;

        let mut novel_url_list = Vec::new();
        let mut cancelled = false;
        for (_, result) in results {
            match result {
                Ok(refs) => novel_url_list.extend(refs),
                Err(SourceError::Cancelled) => cancelled = true,
                Err(err) => return Err(err),
            }
        }
        if cancelled {
            return Err(SourceError::Cancelled);
        }

        Ok(DecomposeResponse { novel_url_list })
    }

    /// Decomposes every URL, collecting per-input failures instead of
    /// aborting. Malformed input still fails the whole call.
    pub async fn decompose_lenient(
        &self,
        request: &DecomposeRequest,
        ctx: &RequestContext,
    ) -> Result<PartialDecomposition, SourceError> {
        let inputs = split_input(&request.url_string)?;
        let results = self.run(inputs, ctx, false).await;

        if ctx.cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let mut partial = PartialDecomposition::default();
        for (url, result) in results {
            match result {
                Ok(refs) => partial.succeeded.extend(refs),
                Err(error) => {
                    warn!(%url, %error, "decomposition failed");
                    partial.failed.push(FailedUrl { url, error });
                }
            }
        }
        Ok(partial)
    }

    /// Extracts a single episode.
    pub async fn extract(
        &self,
        request: &ExtractRequest,
        ctx: &RequestContext,
    ) -> Result<NovelRecord, SourceError> {
        let input = InputUrl::parse(request.url.trim())?;
        self.router.extract(&input.url, ctx).await
    }

    /// Routes every input concurrently and returns `(raw token, result)` in
    /// input order.
    async fn run(
        &self,
        inputs: Vec<InputUrl>,
        ctx: &RequestContext,
        fail_fast: bool,
    ) -> Vec<(String, TokenResult)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let cancel = ctx.cancel.child_token();
        let task_ctx = ctx.clone().with_cancel(cancel.clone());

        let tokens: Vec<String> = inputs.iter().map(|input| input.raw.clone()).collect();
        let mut slots: Vec<Option<TokenResult>> = (0..inputs.len()).map(|_| None).collect();

        debug!(count = inputs.len(), "decomposing inputs");

        let mut tasks = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let router = Arc::clone(&self.router);
            let semaphore = Arc::clone(&semaphore);
            let ctx = task_ctx.clone();

            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => Err(SourceError::Cancelled),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(_permit) => router.decompose(&input, &ctx).await,
                        Err(_) => Err(SourceError::Cancelled),
                    },
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if fail_fast && result.is_err() {
                        cancel.cancel();
                    }
                    slots[index] = Some(result);
                }
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => {}
            }
        }

        tokens
            .into_iter()
            .zip(slots)
            .map(|(token, slot)| (token, slot.unwrap_or(Err(SourceError::Cancelled))))
            .collect()
    }
}
