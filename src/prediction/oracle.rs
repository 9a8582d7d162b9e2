// Resolution oracle collaborator
//
// The oracle judges a question text against platform context and returns a
// boolean verdict with a confidence score. It is slow, remote and
// best-effort: every failure mode (timeout, transport error, malformed
// reply) surfaces as a collaborator error and leaves the question untouched
// for the next sweep.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Verdict returned by the oracle for one question.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OracleVerdict {
    /// true = YES, false = NO
    pub resolution: bool,
    /// 0-100; verdicts below the engine's minimum are discarded
    pub confidence: u8,
    pub reasoning: String,
}

#[async_trait]
pub trait ResolutionOracle: Send + Sync {
    async fn resolve(
        &self,
        question: &str,
        platform_context: &str,
    ) -> Result<OracleVerdict, EngineError>;
}

/// HTTP oracle client.
///
/// POSTs `{question, context}` and expects an [`OracleVerdict`] JSON body.
pub struct HttpOracle {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpOracle {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build oracle http client");
        Self {
            client,
            url,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    question: &'a str,
    context: &'a str,
}

#[async_trait]
impl ResolutionOracle for HttpOracle {
    async fn resolve(
        &self,
        question: &str,
        platform_context: &str,
    ) -> Result<OracleVerdict, EngineError> {
        let mut request = self.client.post(&self.url).json(&ResolveRequest {
            question,
            context: platform_context,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Oracle(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Oracle(format!(
                "oracle returned status {}",
                response.status()
            )));
        }

        let verdict: OracleVerdict = response
            .json()
            .await
            .map_err(|e| EngineError::Oracle(format!("malformed verdict: {}", e)))?;

        if verdict.confidence > 100 {
            return Err(EngineError::Oracle(format!(
                "confidence {} out of range",
                verdict.confidence
            )));
        }
        Ok(verdict)
    }
}
