//! Invite and session tokens for remote peers.
//!
//! Secrets are 32 random bytes, hex encoded, and handed out exactly once.
//! Only their blake3 hash is kept. Redeeming an invite turns it into a
//! session with the same secret, so a peer can reconnect with the link it
//! was given.

use crate::error::{Error, Result};
use streamwall_protocols::{AuthState, AuthTokenInfo, Role, TokenKind};
use tracing::info;

#[derive(Debug, Clone)]
struct TokenEntry {
    info: AuthTokenInfo,
    hash: blake3::Hash,
}

/// A freshly created invite together with its one-time secret.
#[derive(Debug, Clone)]
pub struct Invite {
    pub info: AuthTokenInfo,
    pub secret: String,
}

#[derive(Debug, Default)]
pub struct AuthTokens {
    tokens: Vec<TokenEntry>,
}

impl AuthTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an invite granting `role`.
    pub fn create_invite(&mut self, role: Role, name: impl Into<String>) -> Result<Invite> {
        if !role.is_grantable() {
            return Err(Error::InvalidInput(format!("role {} cannot be granted", role)));
        }

        let secret = hex::encode(rand::random::<[u8; 32]>());
        let info = AuthTokenInfo {
            token_id: hex::encode(rand::random::<[u8; 8]>()),
            kind: TokenKind::Invite,
            role,
            name: name.into(),
        };
        info!(token_id = %info.token_id, role = %role, name = %info.name, "created invite");

        self.tokens.push(TokenEntry {
            info: info.clone(),
            hash: blake3::hash(secret.as_bytes()),
        });
        Ok(Invite { info, secret })
    }

    /// Remove an invite or session. Returns whether it existed.
    pub fn delete(&mut self, token_id: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t.info.token_id != token_id);
        let removed = self.tokens.len() != before;
        if removed {
            info!(token_id, "deleted token");
        }
        removed
    }

    /// Look up the token for `secret`, redeeming it if it is an invite.
    pub fn authenticate(&mut self, secret: &str) -> Option<AuthTokenInfo> {
        let hash = blake3::hash(secret.as_bytes());
        // blake3::Hash equality is constant time
        let entry = self.tokens.iter_mut().find(|t| t.hash == hash)?;
        if entry.info.kind == TokenKind::Invite {
            entry.info.kind = TokenKind::Session;
            info!(token_id = %entry.info.token_id, "invite redeemed");
        }
        Some(entry.info.clone())
    }

    pub fn invites(&self) -> Vec<AuthTokenInfo> {
        self.of_kind(TokenKind::Invite)
    }

    pub fn sessions(&self) -> Vec<AuthTokenInfo> {
        self.of_kind(TokenKind::Session)
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            invites: self.invites(),
            sessions: self.sessions(),
        }
    }

    fn of_kind(&self, kind: TokenKind) -> Vec<AuthTokenInfo> {
        self.tokens
            .iter()
            .filter(|t| t.info.kind == kind)
            .map(|t| t.info.clone())
            .collect()
    }
}
