//! Built-in middlewares.
//!
//! Each type implements [`Middleware`](crate::chain::Middleware) and can be
//! appended from code or mounted from `[[mounts]]` config entries.

pub mod cors;
pub mod security_headers;
pub mod serve_file;

pub use cors::Cors;
pub use security_headers::SecurityHeaders;
pub use serve_file::ServeFile;

use crate::chain::ChainStack;
use crate::config::MountConfig;
use crate::error::ChainError;

/// Append the middleware described by `mount` to `stack`.
pub fn mount(stack: &ChainStack, mount: &MountConfig) -> Result<(), ChainError> {
    match mount {
        MountConfig::Cors { prefix, allow_origin } => stack.append(prefix, Cors::allow_origin(allow_origin))?,
        MountConfig::SecurityHeaders { prefix } => stack.append(prefix, SecurityHeaders)?,
        MountConfig::Static {
            prefix,
            file,
            content_type,
        } => stack.append(prefix, ServeFile::new(file).content_type(content_type))?,
    };
    tracing::info!(kind = mount.kind(), prefix = mount.prefix(), "middleware mounted");
    Ok(())
}
