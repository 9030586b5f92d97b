//! Mapping between remote keys and setting names.
//!
//! Remote keys look like `/config/<server>/<variable>`; the setting name is
//! the final path segment.

/// Root under which every server's configuration lives.
pub const CONFIG_ROOT: &str = "/config/";

/// Path separator of remote keys.
pub const SEPARATOR: char = '/';

/// Extracts the setting name from a remote key.
///
/// Returns everything after the final separator. A key that ends at a
/// separator (such as the root itself) yields the empty name. Applying the
/// function to its own output returns the same name.
///
/// ```rust
/// use cfgwatch_sync::keypath::to_setting_name;
///
/// assert_eq!(to_setting_name("/config/web1/timeout", "/config/"), "timeout");
/// assert_eq!(to_setting_name("/config/web1/", "/config/"), "");
/// assert_eq!(to_setting_name("timeout", "/config/"), "timeout");
/// ```
pub fn to_setting_name<'a>(remote_key: &'a str, root_prefix: &str) -> &'a str {
    let below_root = remote_key.strip_prefix(root_prefix).unwrap_or(remote_key);
    match below_root.rfind(SEPARATOR) {
        Some(position) => &below_root[position + SEPARATOR.len_utf8()..],
        None => below_root,
    }
}

/// Builds the remote key for a server's variable.
///
/// ```rust
/// use cfgwatch_sync::keypath::{build_key, CONFIG_ROOT};
///
/// assert_eq!(build_key(CONFIG_ROOT, "web1", "timeout"), "/config/web1/timeout");
/// ```
pub fn build_key(root_prefix: &str, server: &str, variable: &str) -> String {
    format!(
        "{}{}{}",
        server_prefix(root_prefix, server),
        SEPARATOR,
        variable
    )
}

/// Builds the watched directory for a server (`/config/web1`).
pub fn server_prefix(root_prefix: &str, server: &str) -> String {
    format!(
        "{}{}{}",
        root_prefix.trim_end_matches(SEPARATOR),
        SEPARATOR,
        server
    )
}
