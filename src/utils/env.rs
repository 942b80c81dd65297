/// Read an environment variable, preferring the `ALMONER_`-prefixed form
///
/// `ALMONER_{key}` wins over a bare `{key}`, so a deployment can keep the
/// platform's conventional names (`PORT`) and still override them per app.
///
/// # Examples
///
/// ```rust,ignore
/// // Checks ALMONER_PORT first, then PORT
/// let port = get_env_with_prefix("PORT");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("ALMONER_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Read a boolean flag, falling back to `default` when unset or unparsable
pub fn get_env_flag(key: &str, default: bool) -> bool {
    get_env_with_prefix(key)
        .map(|v| v.parse().unwrap_or(default))
        .unwrap_or(default)
}
