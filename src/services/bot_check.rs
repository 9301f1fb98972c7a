// Vérification anti-bot (Cloudflare Turnstile) avant toute tentative de connexion.
//
// En développement, un token de contournement est accepté et une panne du
// service de vérification laisse passer. En production, tout échec bloque.
// Un token expiré est refusé par le fournisseur (`timeout-or-duplicate`).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, warn};

use crate::config::Environment;
use crate::error::{AppError, AppResult};

pub const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";
pub const DEV_BYPASS_TOKEN: &str = "dev-bypass-token";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VerifyOutcome {
    pub success: bool,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> AppResult<VerifyOutcome>;
}

pub struct TurnstileVerifier {
    client: Client,
    secret: String,
    endpoint: String,
}

impl TurnstileVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret: secret.into(),
            endpoint: SITEVERIFY_URL.to_string(),
        }
    }
}

#[async_trait]
impl ChallengeVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> AppResult<VerifyOutcome> {
        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let outcome = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<VerifyOutcome>()
            .await?;

        Ok(outcome)
    }
}

pub struct BotCheckGate {
    verifier: Option<Arc<dyn ChallengeVerifier>>,
    environment: Environment,
}

impl BotCheckGate {
    pub fn new(verifier: Option<Arc<dyn ChallengeVerifier>>, environment: Environment) -> Self {
        Self { verifier, environment }
    }

    fn is_development(&self) -> bool {
        self.environment != Environment::Production
    }

    pub async fn check(&self, token: Option<&str>, remote_ip: Option<&str>) -> AppResult<()> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Security verification required".into()))?;

        if token == DEV_BYPASS_TOKEN {
            if self.is_development() {
                warn!("⚠️ Bot check bypassed (development)");
                return Ok(());
            }
            return Err(AppError::Unauthorized("Security verification failed".into()));
        }

        let Some(verifier) = &self.verifier else {
            if self.is_development() {
                warn!("⚠️ Bot check not configured, bypassing (development)");
                return Ok(());
            }
            error!("❌ Bot check not configured in production");
            return Err(AppError::Unauthorized("Security verification unavailable".into()));
        };

        match verifier.verify(token, remote_ip).await {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => {
                warn!("⚠️ Bot check rejected: {:?}", outcome.error_codes);
                Err(AppError::Unauthorized("Security verification failed".into()))
            }
            Err(e) if self.is_development() => {
                warn!("⚠️ Bot check unreachable, bypassing (development): {}", e);
                Ok(())
            }
            Err(e) => {
                error!("❌ Bot check unreachable: {}", e);
                Err(AppError::Unauthorized("Security verification unavailable".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedVerifier(AppResult<VerifyOutcome>);

    #[async_trait]
    impl ChallengeVerifier for FixedVerifier {
        async fn verify(&self, _token: &str, _remote_ip: Option<&str>) -> AppResult<VerifyOutcome> {
            match &self.0 {
                Ok(outcome) => Ok(outcome.clone()),
                Err(_) => Err(AppError::storage("network down")),
            }
        }
    }

    fn gate(result: AppResult<VerifyOutcome>, environment: Environment) -> BotCheckGate {
        BotCheckGate::new(Some(Arc::new(FixedVerifier(result))), environment)
    }

    fn outcome(success: bool) -> AppResult<VerifyOutcome> {
        Ok(VerifyOutcome {
            success,
            error_codes: if success { vec![] } else { vec!["invalid-input-response".into()] },
        })
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let gate = gate(outcome(true), Environment::Development);
        assert!(gate.check(None, None).await.is_err());
        assert!(gate.check(Some("  "), None).await.is_err());
    }

    #[tokio::test]
    async fn test_verifier_decides() {
        assert!(gate(outcome(true), Environment::Production).check(Some("tok"), None).await.is_ok());
        assert!(gate(outcome(false), Environment::Production).check(Some("tok"), None).await.is_err());
        assert!(gate(outcome(false), Environment::Development).check(Some("tok"), None).await.is_err());
    }

    #[tokio::test]
    async fn test_bypass_token_only_in_development() {
        let dev = gate(outcome(false), Environment::Development);
        let prod = gate(outcome(true), Environment::Production);

        assert!(dev.check(Some(DEV_BYPASS_TOKEN), None).await.is_ok());
        assert!(prod.check(Some(DEV_BYPASS_TOKEN), None).await.is_err());
    }

    #[tokio::test]
    async fn test_network_failure_depends_on_environment() {
        let down = || Err(AppError::storage("x"));
        assert!(gate(down(), Environment::Development).check(Some("tok"), None).await.is_ok());
        assert!(gate(down(), Environment::Production).check(Some("tok"), None).await.is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_gate() {
        let dev = BotCheckGate::new(None, Environment::Development);
        let prod = BotCheckGate::new(None, Environment::Production);
        assert!(dev.check(Some("tok"), None).await.is_ok());
        assert!(prod.check(Some("tok"), None).await.is_err());
    }

    #[test]
    fn test_outcome_parses_error_codes() {
        let outcome: VerifyOutcome =
            serde_json::from_str(r#"{"success":false,"error-codes":["timeout-or-duplicate"]}"#).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_codes, vec!["timeout-or-duplicate"]);
    }
}
