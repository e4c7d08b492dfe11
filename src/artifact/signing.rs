//! Debug-grade package signing
//!
//! Signing is optional: a package that cannot be signed is still usable for
//! side-loaded testing on most emulation platforms. The signer therefore
//! never fails the run. It walks an explicit state machine and reports how
//! far it got:
//!
//! ```text
//! NoIdentity ──keygen ok──▶ IdentityCreated ──sign ok──▶ Signed
//!     │                            │
//!     └─keygen failed─▶ SigningSkipped   └─sign failed─▶ SigningFailed
//! IdentityReused ──sign ok──▶ Signed
//! ```
//!
//! Both degraded end states return the unsigned input archive.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::SourceArchive;
use crate::toolchain::{ToolInvocation, ToolRunner};

/// Keystore file name inside the identity scope
pub const KEYSTORE_FILE_NAME: &str = "debug.keystore";

/// Key alias inside the keystore
pub const KEY_ALIAS: &str = "androiddebugkey";

/// Store and key passphrase. Debug-grade and public by convention.
pub const KEYSTORE_PASSWORD: &str = "android";

pub const KEY_ALGORITHM: &str = "RSA";

pub const KEY_SIZE: u32 = 2048;

pub const VALIDITY_DAYS: u32 = 10_000;

pub const DISTINGUISHED_NAME: &str = "CN=Android Debug,O=Android,C=US";

/// Signer states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningState {
    NoIdentity,
    IdentityCreated,
    IdentityReused,
    Signed,
    SigningSkipped,
    SigningFailed,
}

impl SigningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SigningState::Signed | SigningState::SigningSkipped | SigningState::SigningFailed
        )
    }
}

/// Why the signer returned the unsigned archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningDegraded {
    pub state: SigningState,
    pub reason: String,
}

/// Result of a signing attempt
#[derive(Debug, Clone)]
pub struct SignOutcome {
    /// Signed package, or the untouched input when degraded
    pub artifact: SourceArchive,
    /// States visited, in order
    pub trail: Vec<SigningState>,
    pub degraded: Option<SigningDegraded>,
}

impl SignOutcome {
    pub fn is_signed(&self) -> bool {
        self.degraded.is_none()
    }

    pub fn final_state(&self) -> SigningState {
        self.trail
            .last()
            .copied()
            .unwrap_or(SigningState::NoIdentity)
    }
}

/// Reusable keystore scoped to one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    keystore: PathBuf,
}

impl SigningIdentity {
    /// Identity stored as `<scope>/debug.keystore`
    pub fn scoped_to(scope: &Path) -> Self {
        Self {
            keystore: scope.join(KEYSTORE_FILE_NAME),
        }
    }

    pub fn keystore(&self) -> &Path {
        &self.keystore
    }

    pub fn exists(&self) -> bool {
        self.keystore.is_file()
    }
}

/// Signs packages with keytool + jarsigner
#[derive(Debug, Clone)]
pub struct ArtifactSigner {
    keytool: Option<PathBuf>,
    jarsigner: Option<PathBuf>,
    runner: ToolRunner,
    keygen_timeout: Duration,
    sign_timeout: Duration,
}

impl ArtifactSigner {
    pub fn new(
        keytool: Option<PathBuf>,
        jarsigner: Option<PathBuf>,
        runner: ToolRunner,
        keygen_timeout: Duration,
        sign_timeout: Duration,
    ) -> Self {
        Self {
            keytool,
            jarsigner,
            runner,
            keygen_timeout,
            sign_timeout,
        }
    }

    /// Sign `archive` into `signed_path`. Never fails; see the module docs.
    pub fn sign(
        &self,
        archive: &SourceArchive,
        identity: &SigningIdentity,
        signed_path: &Path,
    ) -> SignOutcome {
        let mut trail = Vec::new();

        if identity.exists() {
            trail.push(SigningState::IdentityReused);
        } else {
            trail.push(SigningState::NoIdentity);
            if let Err(reason) = self.create_identity(identity) {
                return self.degrade(archive, trail, SigningState::SigningSkipped, reason);
            }
            trail.push(SigningState::IdentityCreated);
        }

        match self.sign_with(archive, identity, signed_path) {
            Ok(signed) => {
                info!(artifact = %signed.path().display(), "package signed");
                trail.push(SigningState::Signed);
                SignOutcome {
                    artifact: signed,
                    trail,
                    degraded: None,
                }
            }
            Err(reason) => self.degrade(archive, trail, SigningState::SigningFailed, reason),
        }
    }

    fn degrade(
        &self,
        archive: &SourceArchive,
        mut trail: Vec<SigningState>,
        state: SigningState,
        reason: String,
    ) -> SignOutcome {
        warn!(?state, %reason, "signing degraded, returning unsigned package");
        trail.push(state);
        SignOutcome {
            artifact: archive.clone(),
            trail,
            degraded: Some(SigningDegraded { state, reason }),
        }
    }

    fn create_identity(&self, identity: &SigningIdentity) -> Result<(), String> {
        let keytool = self
            .keytool
            .as_ref()
            .ok_or_else(|| "keytool not available".to_string())?;

        if let Some(parent) = identity.keystore().parent() {
            fs::create_dir_all(parent).map_err(|e| format!("cannot create keystore dir: {e}"))?;
        }

        let invocation = ToolInvocation::new(keytool, self.keygen_timeout)
            .args(["-genkeypair", "-v", "-keystore"])
            .arg(identity.keystore())
            .args(["-storepass", KEYSTORE_PASSWORD, "-alias", KEY_ALIAS])
            .args(["-keypass", KEYSTORE_PASSWORD, "-keyalg", KEY_ALGORITHM])
            .arg("-keysize")
            .arg(KEY_SIZE.to_string())
            .arg("-validity")
            .arg(VALIDITY_DAYS.to_string())
            .args(["-dname", DISTINGUISHED_NAME]);

        match self.runner.run_checked(&invocation) {
            Ok(_) if identity.exists() => {
                info!(keystore = %identity.keystore().display(), "debug keystore created");
                Ok(())
            }
            Ok(_) => Err("keytool reported success but wrote no keystore".to_string()),
            Err(e) => {
                // a half-written keystore would be reused by the next run
                let _ = fs::remove_file(identity.keystore());
                Err(e.to_string())
            }
        }
    }

    fn sign_with(
        &self,
        archive: &SourceArchive,
        identity: &SigningIdentity,
        signed_path: &Path,
    ) -> Result<SourceArchive, String> {
        let jarsigner = self
            .jarsigner
            .as_ref()
            .ok_or_else(|| "jarsigner not available".to_string())?;

        let invocation = ToolInvocation::new(jarsigner, self.sign_timeout)
            .args(["-verbose", "-keystore"])
            .arg(identity.keystore())
            .args(["-storepass", KEYSTORE_PASSWORD, "-keypass", KEYSTORE_PASSWORD])
            .arg("-signedjar")
            .arg(signed_path)
            .arg(archive.path())
            .arg(KEY_ALIAS);

        if let Err(e) = self.runner.run_checked(&invocation) {
            let _ = fs::remove_file(signed_path);
            return Err(e.to_string());
        }

        SourceArchive::open(signed_path).map_err(|e| format!("signed package unusable: {e}"))
    }
}
