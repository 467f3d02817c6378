// Tollgate — Remote Module
//
// Talks to the organization's clientIdSecrets API: issue a token for a
// remote role, delete a token by client id. One client per organization
// lives in the `ClientRegistry`, rebuilt lazily after invalidation.

mod client;
mod error;
mod registry;

pub use client::{ClientFactory, HttpClientFactory, HttpTokenClient, IssuedToken, TokenApi};
pub use error::RemoteError;
pub use registry::ClientRegistry;
