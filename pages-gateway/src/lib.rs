pub mod auth;
pub mod branch;
pub mod classify;
pub mod host_api;
pub mod pipeline;
pub mod registry;

pub use auth::{
    cookie_attributes, password_matches, render_login_page, scope_for, sha256_hex, sign_cookie,
    verify_cookie, PasswordHashCache, PasswordHashSource, PasswordKind,
};
pub use branch::{register_branches, sanitise_branch};
pub use classify::{classify, canonicalise_path, RequestKind};
pub use host_api::{ForgejoHostApi, HostApi, HostApiError};
pub use pipeline::{CacheStatus, ContentPipeline, PipelineResponse, DEFAULT_BRANCH_KEY};
pub use registry::{DnsVerifier, DomainRegistry};
