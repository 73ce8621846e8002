use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::{EvaluatorError, EvaluatorKind, FairnessAuditor, MlEvaluator, RuleEvaluator};
use crate::config::CoordinatorConfig;
use crate::coordination::domain::{
    BorrowerId, EvaluationRequest, FairnessResult, MlResult, MlStatus, ResultId, RuleResult,
    RuleStatus,
};

const MAX_ERROR_BODY: usize = 256;

/// `reqwest` client posting to the evaluator services.
///
/// The per-call timeout is enforced by the underlying client so an abandoned call
/// still finishes on its own.
#[derive(Debug, Clone)]
pub struct HttpEvaluatorClient {
    client: reqwest::Client,
    rule_url: String,
    ml_url: String,
    fairness_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EvaluateBody<'a> {
    user_id: &'a str,
    document_id: &'a str,
}

#[derive(Serialize)]
struct FairnessBody<'a> {
    user_id: &'a str,
    ml_result_id: &'a str,
}

#[derive(Deserialize)]
struct RuleResponse {
    status: RuleStatus,
    #[serde(default)]
    reasons: BTreeMap<String, String>,
    rule_result_id: String,
}

#[derive(Deserialize)]
struct MlResponse {
    status: MlStatus,
    #[serde(deserialize_with = "deserialize_confidence")]
    confidence: f64,
    ml_result_id: String,
    #[serde(default, alias = "shap_summary")]
    feature_attribution: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct FairnessResponse {
    is_biased: bool,
    #[serde(default)]
    flagged_features: BTreeMap<String, String>,
    audit_result_id: String,
    #[serde(default)]
    audit_notes: Option<String>,
}

/// The ML service encodes confidence as a string; plain numbers are accepted too.
fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| serde::de::Error::custom(format!("confidence '{text}': {err}"))),
    }
}

impl HttpEvaluatorClient {
    pub fn new(config: &CoordinatorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .build()?;

        Ok(Self {
            client,
            rule_url: endpoint(&config.rule_engine_url, "evaluate-rules"),
            ml_url: endpoint(&config.ml_decision_url, "evaluate-ml-decision"),
            fairness_url: endpoint(&config.fairness_auditor_url, "fairness-auditor"),
            timeout: config.call_timeout,
        })
    }

    async fn post<B, T>(
        &self,
        evaluator: EvaluatorKind,
        url: &str,
        body: &B,
    ) -> Result<T, EvaluatorError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%evaluator, url, "calling evaluator");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| self.classify(evaluator, err))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(EvaluatorError::Protocol {
                evaluator,
                detail: format!("status {}: {}", status.as_u16(), body),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.classify(evaluator, err))?;

        serde_json::from_slice(&bytes).map_err(|err| EvaluatorError::Protocol {
            evaluator,
            detail: err.to_string(),
        })
    }

    fn classify(&self, evaluator: EvaluatorKind, err: reqwest::Error) -> EvaluatorError {
        if err.is_timeout() {
            EvaluatorError::Timeout {
                evaluator,
                timeout: self.timeout,
            }
        } else if err.is_decode() || err.is_body() {
            EvaluatorError::Protocol {
                evaluator,
                detail: err.to_string(),
            }
        } else {
            EvaluatorError::Unreachable {
                evaluator,
                detail: err.to_string(),
            }
        }
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

#[async_trait]
impl RuleEvaluator for HttpEvaluatorClient {
    async fn evaluate_rules(
        &self,
        request: &EvaluationRequest,
    ) -> Result<RuleResult, EvaluatorError> {
        let body = EvaluateBody {
            user_id: &request.borrower_id.0,
            document_id: &request.document_id.0,
        };
        let response: RuleResponse = self.post(EvaluatorKind::Rule, &self.rule_url, &body).await?;

        Ok(RuleResult {
            status: response.status,
            reasons: response.reasons,
            result_id: ResultId(response.rule_result_id),
        })
    }
}

#[async_trait]
impl MlEvaluator for HttpEvaluatorClient {
    async fn evaluate_ml(&self, request: &EvaluationRequest) -> Result<MlResult, EvaluatorError> {
        let body = EvaluateBody {
            user_id: &request.borrower_id.0,
            document_id: &request.document_id.0,
        };
        let response: MlResponse = self.post(EvaluatorKind::Ml, &self.ml_url, &body).await?;

        if !(0.0..=1.0).contains(&response.confidence) {
            return Err(EvaluatorError::Protocol {
                evaluator: EvaluatorKind::Ml,
                detail: format!("confidence {} outside [0, 1]", response.confidence),
            });
        }

        Ok(MlResult {
            status: response.status,
            confidence: response.confidence,
            result_id: ResultId(response.ml_result_id),
            feature_attribution: response.feature_attribution,
        })
    }
}

#[async_trait]
impl FairnessAuditor for HttpEvaluatorClient {
    async fn audit(
        &self,
        borrower_id: &BorrowerId,
        ml_result_id: &ResultId,
    ) -> Result<FairnessResult, EvaluatorError> {
        let body = FairnessBody {
            user_id: &borrower_id.0,
            ml_result_id: &ml_result_id.0,
        };
        let response: FairnessResponse = self
            .post(EvaluatorKind::Fairness, &self.fairness_url, &body)
            .await?;

        Ok(FairnessResult {
            is_biased: response.is_biased,
            flagged_features: response.flagged_features,
            result_id: ResultId(response.audit_result_id),
            notes: response.audit_notes,
        })
    }
}
