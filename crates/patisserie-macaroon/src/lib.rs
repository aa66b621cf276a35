//! # patisserie-macaroon
//!
//! Macaroons: bearer credentials whose holders can add restrictions but
//! never remove them.
//!
//! This crate provides functionality for:
//! - Minting root macaroons from a secret and a public identifier
//! - Attenuating them with first-party and third-party caveats
//! - Binding discharge macaroons to the macaroon they accompany
//! - Verifying a macaroon together with its discharges
//! - Encoding and decoding the V1, V2 and V2 JSON wire formats
//!
//! ## Signature Chain
//!
//! | Step | New signature |
//! |------|---------------|
//! | mint | `HMAC(derive(secret), identifier)` |
//! | first-party caveat | `HMAC(sig, predicate)` |
//! | third-party caveat | `HMAC(sig, HMAC(sig, vid) \|\| HMAC(sig, cid))` |
//! | bind discharge | `HMAC(0, HMAC(0, root_sig) \|\| HMAC(0, discharge_sig))` |
//!
//! where `derive(secret) = HMAC("macaroons-key-generator", secret)`.
//!
//! ## Example
//!
//! ```
//! use patisserie_macaroon::{Macaroon, SerializationFormat};
//!
//! let secret = "this is our super secret key; only we should know it";
//! let macaroon = Macaroon::create("http://mybank/", secret, "we used our secret key")?
//!     .add_first_party_caveat("account = 3735928559")?;
//!
//! let wire = macaroon.serialize(SerializationFormat::V2)?;
//! let received = Macaroon::deserialize(&wire, SerializationFormat::V2)?;
//!
//! let mut verifier = received.verifier();
//! verifier.satisfy_exact("account = 3735928559");
//! assert!(verifier.is_valid(secret)?);
//! # Ok::<(), patisserie_macaroon::MacaroonError>(())
//! ```

pub mod builder;
pub mod caveats;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod macaroon;
pub mod packet;
pub mod serialization;
pub mod verifier;

pub use builder::MacaroonBuilder;
pub use caveats::{AuthoritiesCaveatVerifier, TimestampCaveatVerifier};
pub use crypto::{CryptoProvider, DefaultCrypto};
pub use error::MacaroonError;
pub use keys::RootKey;
pub use macaroon::{Caveat, Caveats, Macaroon};
pub use packet::{CaveatPacket, PacketKind};
pub use patisserie_core::{Limits, MacaroonConfig, SerializationFormat, VerifierSettings};
pub use verifier::{CaveatVerifier, Verifier};
