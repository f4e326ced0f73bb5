pub mod config;
pub mod domain;
pub mod error;
pub mod redirects;
pub mod repo_config;
pub mod router_record;

pub use config::PagesConfig;
pub use domain::DomainBinding;
pub use error::PagesError;
pub use redirects::{RedirectRule, parse_redirects};
pub use repo_config::RepoConfig;
pub use router_record::RouterRecord;
