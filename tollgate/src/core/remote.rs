//! Git remote URL normalization.

/// Rewrite SSH-style remotes into their HTTPS form so a clone works without
/// SSH credentials (CI runners rarely have them). Anything that is not an SSH
/// remote, including local paths, is returned trimmed but otherwise as-is.
pub fn canonicalize_remote(remote: &str) -> String {
    use std::sync::LazyLock;
    static SCP_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"^[\w.-]+@([^:/]+):/?(.+)$").unwrap());
    static SSH_URL_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"^ssh://(?:[\w.-]+@)?([^:/]+)(?::\d+)?/(.+)$").unwrap());

    let remote = remote.trim();
    if let Some(caps) = SSH_URL_RE.captures(remote) {
        return format!("https://{}/{}", &caps[1], &caps[2]);
    }
    if let Some(caps) = SCP_RE.captures(remote) {
        return format!("https://{}/{}", &caps[1], &caps[2]);
    }
    remote.to_string()
}
