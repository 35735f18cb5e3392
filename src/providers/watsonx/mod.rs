pub mod auth;
pub mod client;
pub mod decoder;
pub mod types;

pub use auth::IamTokenProvider;
pub use client::{build_payload, format_prompt, WatsonxProvider};
pub use decoder::{decode, EventStream, WireFormat};
