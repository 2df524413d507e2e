mod env_vars;
mod upload_config;

pub use env_vars::expand_env_vars;
pub use upload_config::UploadConfig;
