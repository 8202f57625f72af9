use anyhow::{Context, Result};

/// Parses the value `lookup` returns for `key`, or falls back to `default`
/// when the variable is unset. An unparseable value is a startup error.
pub fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: `{raw}`")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_when_unset() {
        let lookup = |_: &str| None;
        assert_eq!(parse_or(&lookup, "PORT", 8080u16).unwrap(), 8080);
    }

    #[test]
    fn parses_set_value() {
        let lookup = |key: &str| (key == "PORT").then(|| "9000".to_string());
        assert_eq!(parse_or(&lookup, "PORT", 8080u16).unwrap(), 9000);
    }

    #[test]
    fn rejects_garbage() {
        let lookup = |_: &str| Some("nope".to_string());
        let err = parse_or(&lookup, "PORT", 8080u16).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
