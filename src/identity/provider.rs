//! Ed25519 backend selection.
//!
//! Backends are tried in a fixed preference order; the first one that
//! produces a keypair wins. A backend compiled out of the build advances the
//! search silently, a backend that is present but errors is reported first.
//! The last resort is an insecure random-bytes generator that always
//! succeeds, so key generation itself can never fail.

use sha2::{Digest, Sha256};

/// A freshly generated keypair, held in memory only long enough to persist.
pub struct KeyMaterial {
    /// 32-byte private signing seed.
    pub private_bytes: Vec<u8>,
    /// 32-byte public verification key.
    pub public_bytes: Vec<u8>,
}

/// Result of asking one backend for a keypair.
pub enum ProviderOutcome {
    /// Backend not compiled into this build.
    Unavailable,
    /// Backend present but generation errored.
    Failed(anyhow::Error),
    Generated(KeyMaterial),
}

/// One candidate backend in the preference order.
pub struct Provider {
    pub name: &'static str,
    pub generate: fn() -> ProviderOutcome,
}

/// Reported provider name when the insecure fallback was used.
pub const FALLBACK_PROVIDER: &str = "insecure-fallback (NOT Ed25519)";

const PROVIDERS: &[Provider] = &[
    Provider {
        name: "ed25519-dalek",
        generate: generate_dalek,
    },
    Provider {
        name: "ring",
        generate: generate_ring,
    },
];

#[cfg(feature = "dalek-backend")]
fn generate_dalek() -> ProviderOutcome {
    let signing_key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    ProviderOutcome::Generated(KeyMaterial {
        private_bytes: signing_key.to_bytes().to_vec(),
        public_bytes: signing_key.verifying_key().to_bytes().to_vec(),
    })
}

#[cfg(not(feature = "dalek-backend"))]
fn generate_dalek() -> ProviderOutcome {
    ProviderOutcome::Unavailable
}

#[cfg(feature = "ring-backend")]
fn generate_ring() -> ProviderOutcome {
    use anyhow::anyhow;
    use ring::rand::{SecureRandom, SystemRandom};
    use ring::signature::{Ed25519KeyPair, KeyPair};

    let rng = SystemRandom::new();
    let mut seed = [0u8; 32];
    if let Err(e) = rng.fill(&mut seed) {
        return ProviderOutcome::Failed(anyhow!("system RNG failed: {e}"));
    }
    let keypair = match Ed25519KeyPair::from_seed_unchecked(&seed) {
        Ok(kp) => kp,
        Err(e) => return ProviderOutcome::Failed(anyhow!("seed rejected: {e}")),
    };
    ProviderOutcome::Generated(KeyMaterial {
        private_bytes: seed.to_vec(),
        public_bytes: keypair.public_key().as_ref().to_vec(),
    })
}

#[cfg(not(feature = "ring-backend"))]
fn generate_ring() -> ProviderOutcome {
    ProviderOutcome::Unavailable
}

/// Last-resort generator: 32 random bytes as the "private" half and their
/// SHA-256 digest as the "public" half. NOT a real Ed25519 keypair — it only
/// keeps the tool runnable for structural testing on a build with every
/// backend feature disabled.
fn generate_fallback() -> KeyMaterial {
    use rand::RngCore;

    let mut private_bytes = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut private_bytes);
    let public_bytes = Sha256::digest(&private_bytes).to_vec();
    KeyMaterial {
        private_bytes,
        public_bytes,
    }
}

/// Generate one keypair from the highest-preference backend that works.
/// Never fails: the fallback tier has no external dependency.
pub fn select_and_generate() -> (KeyMaterial, &'static str) {
    select_from(PROVIDERS)
}

fn select_from(providers: &[Provider]) -> (KeyMaterial, &'static str) {
    for provider in providers {
        match (provider.generate)() {
            ProviderOutcome::Generated(material) => {
                tracing::info!("🔑 Generated Ed25519 keypair via {}", provider.name);
                return (material, provider.name);
            }
            ProviderOutcome::Unavailable => {
                tracing::debug!("backend {} not compiled in, trying next", provider.name);
            }
            ProviderOutcome::Failed(e) => {
                tracing::warn!("⚠️  Backend {} present but failed: {e:#}", provider.name);
            }
        }
    }

    tracing::warn!(
        "⚠️  No Ed25519 backend available — generating INSECURE fallback keys. \
         Do not use this identity in production."
    );
    (generate_fallback(), FALLBACK_PROVIDER)
}
