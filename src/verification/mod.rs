pub mod cache;
pub mod ollama;
pub mod prompt;
pub mod verifier;

pub use ollama::OllamaComparator;
pub use verifier::{AiVerifier, ContactComparator, VerdictSource, VerifiedPair};
