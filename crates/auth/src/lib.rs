//! Bearer token acquisition for the proxy.
//!
//! [`TokenCache`] holds the single cached token shared by all requests. The
//! remaining modules implement [`TokenCredential`] against Microsoft Entra ID:
//! each source covers one way a workload can prove its identity, and
//! [`DefaultAzureCredential`] chains them in the usual order.
//!
//! [`TokenCredential`]: tokenrelay_types::TokenCredential

pub mod cache;
pub mod chain;
pub mod cli;
mod entra;
pub mod environment;
pub mod managed_identity;
pub mod workload;

pub use cache::{EXPIRY_MARGIN, TokenCache};
pub use chain::DefaultAzureCredential;
pub use cli::AzureCliCredential;
pub use environment::EnvironmentCredential;
pub use managed_identity::ManagedIdentityCredential;
pub use workload::WorkloadIdentityCredential;
