//! Passcode auth gate.
//!
//! Mutating endpoints require a bearer token issued by `login`. Until a
//! passcode is configured, the surface stays open so the setup wizard can
//! reach `auth/setup`; once set, unauthenticated clients see the read-only
//! surface.

use agenshield_vault::passcode::PasscodeVault;
use std::collections::HashSet;
use std::sync::RwLock;

pub struct AuthState {
    passcodes: PasscodeVault,
    tokens: RwLock<HashSet<String>>,
}

impl AuthState {
    pub fn new(passcodes: PasscodeVault) -> Self {
        Self {
            passcodes,
            tokens: RwLock::new(HashSet::new()),
        }
    }

    pub fn passcode_set(&self) -> bool {
        self.passcodes.is_set()
    }

    /// Configure the passcode. Replacing an existing one requires the
    /// current passcode.
    pub fn setup(&self, passcode: &str, current: Option<&str>) -> Result<(), String> {
        if passcode.len() < 4 {
            return Err("Passcode must be at least 4 characters".to_string());
        }
        if self.passcodes.is_set() {
            let verified = current
                .map(|c| self.passcodes.verify(c).unwrap_or(false))
                .unwrap_or(false);
            if !verified {
                return Err("Current passcode required to change it".to_string());
            }
        }
        self.passcodes
            .set(passcode)
            .map_err(|e| format!("Failed to store passcode: {}", e))
    }

    /// Verify the passcode and mint a session token.
    pub fn login(&self, passcode: &str) -> Option<String> {
        match self.passcodes.verify(passcode) {
            Ok(true) => {
                let token = uuid::Uuid::new_v4().to_string();
                self.tokens
                    .write()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(token.clone());
                Some(token)
            }
            _ => None,
        }
    }

    /// Whether a request may mutate state. With no passcode configured the
    /// surface is open; otherwise a valid bearer token is required.
    pub fn may_mutate(&self, bearer_token: Option<&str>) -> bool {
        if !self.passcodes.is_set() {
            return true;
        }
        bearer_token
            .map(|t| {
                self.tokens
                    .read()
                    .unwrap_or_else(|p| p.into_inner())
                    .contains(t)
            })
            .unwrap_or(false)
    }
}
