use std::env;
use std::sync::OnceLock;

/// Name of the variable holding pass-manager options.
pub const PASS_OPTIONS_VAR: &str = "OPGRAPH_PASS_OPTIONS";

static OPGRAPH_PASS_OPTIONS: OnceLock<Option<String>> = OnceLock::new();

/// Pass-manager options string, read once per process. Blank values count as unset.
pub(crate) fn pass_options() -> Option<&'static str> {
    OPGRAPH_PASS_OPTIONS
        .get_or_init(|| match env::var(PASS_OPTIONS_VAR) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        })
        .as_deref()
}
