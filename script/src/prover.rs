//! Remote-first proof generation.
//!
//! When a proving service answers its health check within
//! [`HEALTH_TIMEOUT`], proof construction is delegated to it and its bytes
//! are adopted verbatim. Anything else (no service configured, health
//! check timeout, transport error, or bytes that fail to verify) falls back to
//! the local construction.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use veilpot_lib::proof::{
    verify, Claim, LocalProver, Proof, ProofBackend, ProofError, ProofRequest, Role,
};

/// Bound on the availability check
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Bound on a single remote proof
pub const PROVE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum ProverServiceError {
    #[error("proof service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("proof service returned {0}")]
    Status(u16),

    #[error("proof service returned invalid proof bytes: {0}")]
    InvalidProof(#[from] ProofError),

    #[error("proof service answered for {got:?} instead of the requested role {expected}")]
    WrongPublicInputs { expected: Role, got: Role },
}

#[derive(Serialize)]
struct ContextBody {
    round_root: String,
    amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner_commitment: Option<String>,
}

#[derive(Serialize)]
struct ProveBody {
    secret: String,
    commitment: String,
    context: ContextBody,
}

#[derive(Deserialize)]
struct ProveResponse {
    proof_bytes: String,
}

/// HTTP client for an external proving service
#[derive(Debug, Clone)]
pub struct ProofServiceClient {
    base_url: String,
    http: reqwest::Client,
}

impl ProofServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// `GET /health`, bounded by [`HEALTH_TIMEOUT`]
    pub async fn is_available(&self) -> bool {
        let health = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match health {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "proof service unhealthy");
                false
            }
            Err(e) => {
                debug!(error = %e, "proof service unreachable");
                false
            }
        }
    }

    /// `POST /prove/{role}` returning the raw proof bytes
    pub async fn request_proof(
        &self,
        request: &ProofRequest<'_>,
    ) -> Result<Proof, ProverServiceError> {
        let winner_commitment = match request.context.claim {
            Claim::Withdrawal {
                winner_commitment, ..
            } => winner_commitment.map(|c| c.to_hex()),
            Claim::Deposit { .. } => None,
        };
        let body = ProveBody {
            secret: request.secret.to_hex(),
            commitment: request.commitment.to_hex(),
            context: ContextBody {
                round_root: request.context.round_root.to_hex(),
                amount: request.context.claim.amount(),
                winner_commitment,
            },
        };

        let response = self
            .http
            .post(format!("{}/prove/{}", self.base_url, request.role))
            .timeout(PROVE_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProverServiceError::Status(response.status().as_u16()));
        }

        let ProveResponse { proof_bytes } = response.json().await?;
        let proof = Proof::from_hex(&proof_bytes)?;
        if proof.role() != request.role {
            return Err(ProverServiceError::WrongPublicInputs {
                expected: request.role,
                got: proof.role(),
            });
        }
        Ok(proof)
    }
}

impl ProofBackend for ProofServiceClient {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn prove(&self, request: &ProofRequest<'_>) -> Result<Proof, ProofError> {
        request.check()?;
        self.request_proof(request)
            .await
            .map_err(|e| ProofError::Backend(e.to_string()))
    }
}

/// Which backend produced a proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofOrigin {
    Remote,
    Local,
}

/// Remote-first prover with a local fallback
#[derive(Debug, Clone, Default)]
pub struct ProofEngine {
    remote: Option<ProofServiceClient>,
    local: LocalProver,
}

impl ProofEngine {
    pub fn new(remote_url: Option<&str>) -> Self {
        Self {
            remote: remote_url.map(ProofServiceClient::new),
            local: LocalProver,
        }
    }

    pub fn local_only() -> Self {
        Self::default()
    }

    /// Produce a proof for `request` and check it against the request's
    /// round root before returning it.
    ///
    /// Malformed requests are rejected before anything leaves the process.
    pub async fn prove(
        &self,
        request: &ProofRequest<'_>,
    ) -> Result<(Proof, ProofOrigin), ProofError> {
        request.check()?;

        if let Some(remote) = &self.remote {
            if remote.is_available().await {
                match remote.prove(request).await {
                    Ok(proof) if self.accepts(&proof, request) => {
                        info!(role = %request.role, backend = remote.name(), "adopted remote proof");
                        return Ok((proof, ProofOrigin::Remote));
                    }
                    Ok(_) => warn!("remote proof does not verify, falling back to local construction"),
                    Err(e) => warn!(error = %e, "remote prover failed, falling back to local construction"),
                }
            } else {
                warn!("proof service unavailable, using local construction");
            }
        }

        let proof = self.local.prove(request).await?;
        if !self.accepts(&proof, request) {
            return Err(ProofError::VerificationFailed);
        }
        debug!(role = %request.role, backend = self.local.name(), "built local proof");
        Ok((proof, ProofOrigin::Local))
    }

    fn accepts(&self, proof: &Proof, request: &ProofRequest<'_>) -> bool {
        proof.commitment() == request.commitment
            && proof.role() == request.role
            && verify(proof, &request.context.round_root)
    }
}
