mod acl;
mod config;
mod key;
mod token;

pub use acl::handle_acl_command;
pub use config::handle_config_command;
pub use key::handle_key_command;
pub use token::handle_token_command;
