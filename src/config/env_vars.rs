/// Expand Unix-style environment variables (`$VAR` and `${VAR}`) in a
/// destination key template.
///
/// Variables that are not set, and a `${` without a closing brace, are left
/// as written. Expanded values are not scanned again.
pub fn expand_env_vars(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    let name = &braced[..end];
                    match std::env::var(name) {
                        Ok(value) if !name.is_empty() => result.push_str(&value),
                        _ => result.push_str(&rest[pos..pos + end + 3]),
                    }
                    rest = &braced[end + 1..];
                }
                None => {
                    result.push_str(&rest[pos..]);
                    rest = "";
                }
            }
            continue;
        }

        let name_len = after
            .bytes()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == b'_')
            .count();
        let name = &after[..name_len];
        match std::env::var(name) {
            Ok(value) if name_len > 0 => result.push_str(&value),
            _ => {
                result.push('$');
                result.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_expand_dollar_style() {
        env::set_var("S3A_TEST_HOST", "web01");
        assert_eq!(expand_env_vars("$S3A_TEST_HOST"), "web01");
        assert_eq!(expand_env_vars("backups/$S3A_TEST_HOST/logs.zip"), "backups/web01/logs.zip");
        assert_eq!(expand_env_vars("$S3A_TEST_HOST-logs.zip"), "web01-logs.zip");
        env::remove_var("S3A_TEST_HOST");
    }

    #[test]
    fn test_expand_brace_style() {
        env::set_var("S3A_TEST_ENV", "prod");
        assert_eq!(expand_env_vars("${S3A_TEST_ENV}"), "prod");
        assert_eq!(expand_env_vars("${S3A_TEST_ENV}_archive.zip"), "prod_archive.zip");
        env::remove_var("S3A_TEST_ENV");
    }

    #[test]
    fn test_unset_variables_are_kept() {
        assert_eq!(expand_env_vars("$S3A_TEST_UNSET/a.zip"), "$S3A_TEST_UNSET/a.zip");
        assert_eq!(expand_env_vars("${S3A_TEST_UNSET}.zip"), "${S3A_TEST_UNSET}.zip");
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(expand_env_vars(""), "");
        assert_eq!(expand_env_vars("no-vars.zip"), "no-vars.zip");
        assert_eq!(expand_env_vars("cost$"), "cost$");
        assert_eq!(expand_env_vars("$$"), "$$");
        assert_eq!(expand_env_vars("${}"), "${}");
        assert_eq!(expand_env_vars("${UNCLOSED"), "${UNCLOSED");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        env::set_var("S3A_TEST_DOLLAR", "$HOME");
        assert_eq!(expand_env_vars("${S3A_TEST_DOLLAR}"), "$HOME");
        env::remove_var("S3A_TEST_DOLLAR");
    }
}
