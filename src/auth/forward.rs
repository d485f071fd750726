//! Forward target resolution.

use crate::auth::context::HttpContext;
use crate::auth::options::AuthenticationSchemeOptions;

/// Decide which scheme, if any, an operation should be forwarded to.
///
/// Order: the operation's own forward setting, then the default selector,
/// then `forward_default`. A target equal to `own_scheme` is dropped so a
/// scheme never forwards to itself.
pub fn resolve_target<E>(
    own_scheme: &str,
    explicit: Option<&str>,
    options: &AuthenticationSchemeOptions<E>,
    context: &HttpContext,
) -> Option<String> {
    let target = explicit
        .map(str::to_string)
        .or_else(|| {
            options
                .forward_default_selector
                .as_ref()
                .and_then(|selector| selector(context))
        })
        .or_else(|| options.forward_default.clone())?;

    (target != own_scheme).then_some(target)
}
