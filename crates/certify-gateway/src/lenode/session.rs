//! Le-node session: challenge/response bootstrap, authenticated reconfiguration
//! enablement and remote attestation over one accepted stream.
//!
//! Every procedure returns `true` on success. Failures are logged here and
//! never leak to the device beyond closing or ignoring the stream.

use rand::RngCore;
use tokio::io::AsyncWriteExt;

use certify_core::error::{AuthError, Layer, ProtocolError, Result};
use certify_core::protocol::lenode::{
    self, LeNodeMud, LeNodePayload, ACK_APPLIED, CHALLENGE_LEN,
};

use crate::transport::{read_envelope, send_envelope, DeviceStream};

/// Which incoming envelopes are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Tags are verified when present; untagged envelopes pass.
    Optional,
    /// Every envelope must carry a valid tag.
    Required,
}

/// Largest envelope payload accepted unless configured otherwise.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

pub struct LeNodeSession<S> {
    stream: S,
    key: Vec<u8>,
    policy: AuthPolicy,
    max_payload: usize,
}

fn fresh_challenge() -> [u8; CHALLENGE_LEN] {
    let mut clg = [0u8; CHALLENGE_LEN];
    rand::thread_rng().fill_bytes(&mut clg);
    clg
}

fn unexpected(payload: &LeNodePayload) -> ProtocolError {
    ProtocolError::UnknownType {
        layer: Layer::LeNodePayload,
        tag: payload.payload_type(),
    }
}

impl<S: DeviceStream> LeNodeSession<S> {
    pub fn new(stream: S, key: Vec<u8>) -> Self {
        Self {
            stream,
            key,
            policy: AuthPolicy::Optional,
            max_payload: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    /// Cap on the declared payload length of incoming envelopes.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: AuthPolicy) {
        self.policy = policy;
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Receive one envelope and decode its payload, enforcing the auth policy.
    async fn recv(&mut self) -> Result<LeNodePayload> {
        let env = read_envelope(&mut self.stream, self.max_payload).await?;
        tracing::debug!(
            authenticate = env.header.authenticate,
            bytes = env.payload.len(),
            payload = %hex::encode(&env.payload),
            "le-node envelope"
        );

        if env.header.authenticate {
            if !env.verify(&self.key) {
                return Err(AuthError::TagMismatch.into());
            }
        } else if self.policy == AuthPolicy::Required {
            return Err(AuthError::Unauthenticated.into());
        }

        lenode::decode_payload(&env.payload)
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        send_envelope(&mut self.stream, payload, true, &self.key).await
    }

    /// Send a fresh CLG and check the RSP against it.
    async fn challenge_response(&mut self) -> Result<()> {
        let clg = fresh_challenge();
        self.send(&lenode::clg_message(&clg)).await?;
        tracing::debug!(clg = %hex::encode(clg), "sent CLG");

        match self.recv().await? {
            LeNodePayload::Response(rsp) => {
                if !lenode::response_matches(&self.key, &clg, &rsp) {
                    return Err(AuthError::ResponseMismatch.into());
                }
                Ok(())
            }
            other => Err(unexpected(&other).into()),
        }
    }

    async fn try_bootstrap(&mut self) -> Result<LeNodeMud> {
        let mud = match self.recv().await? {
            LeNodePayload::MudUrl(mud) => mud,
            other => return Err(unexpected(&other).into()),
        };
        tracing::info!(code = mud.code, mud_url = %mud.mud_url, "le-node MUD claim");

        self.challenge_response().await?;
        Ok(mud)
    }

    async fn try_reconf_enable_auth(&mut self) -> Result<()> {
        self.send(&lenode::require_auth_policy_message()).await?;
        tracing::debug!("sent POLICIES");

        match self.recv().await? {
            LeNodePayload::Ack { status } if status == ACK_APPLIED => Ok(()),
            LeNodePayload::Ack { status } => Err(ProtocolError::DecodeFailure(format!(
                "policy not applied, ack status {status}"
            ))
            .into()),
            other => Err(unexpected(&other).into()),
        }
    }

    /// Receive the MUD claim envelope, then run challenge/response.
    pub async fn bootstrap(&mut self) -> bool {
        match self.try_bootstrap().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "le-node bootstrap failed");
                false
            }
        }
    }

    /// Challenge/response only, for claims already read by the dispatcher.
    pub async fn authenticate_claim(&mut self) -> bool {
        match self.challenge_response().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "le-node claim authentication failed");
                false
            }
        }
    }

    /// Push the "authenticate every message" policy and wait for its ACK.
    pub async fn reconf_enable_auth(&mut self) -> bool {
        match self.try_reconf_enable_auth().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "le-node reconfiguration failed");
                false
            }
        }
    }

    /// Fresh challenge/response on an established session.
    pub async fn remote_attestation(&mut self) -> bool {
        match self.challenge_response().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "le-node remote attestation failed");
                false
            }
        }
    }

    /// Write `len` random bytes, which the device treats as a tampered header.
    pub async fn send_tamper_probe(&mut self, len: usize) -> Result<()> {
        let mut junk = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut junk);
        self.stream.write_all(&junk).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
