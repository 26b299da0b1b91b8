//! Path helpers: `{VARNAME}` environment substitution applied to file
//! paths at load time.

/// Replace every `{NAME}` occurrence with the value of the `NAME`
/// environment variable. Unset variables (and stray braces) are left
/// intact so the caller sees what failed to resolve.
pub fn expand_environment_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        match tail.find('}') {
            Some(close) => {
                let name = &tail[..close];
                match std::env::var(name) {
                    Ok(value) if !name.is_empty() => out.push_str(&value),
                    _ => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &tail[close + 1..];
            }
            None => {
                // Unterminated brace, keep the remainder verbatim.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_variables() {
        std::env::set_var("ASHLAR_TEST_DIR", "/tmp/work");
        assert_eq!(
            expand_environment_vars("{ASHLAR_TEST_DIR}/design.v"),
            "/tmp/work/design.v"
        );
    }

    #[test]
    fn unknown_variables_are_left_intact() {
        std::env::remove_var("ASHLAR_TEST_UNSET");
        assert_eq!(
            expand_environment_vars("{ASHLAR_TEST_UNSET}/design.v"),
            "{ASHLAR_TEST_UNSET}/design.v"
        );
    }

    #[test]
    fn plain_paths_pass_through() {
        assert_eq!(expand_environment_vars("a/b/c.lef"), "a/b/c.lef");
        assert_eq!(expand_environment_vars("dangling{brace"), "dangling{brace");
    }

    #[test]
    fn multiple_expansions() {
        std::env::set_var("ASHLAR_TEST_A", "x");
        std::env::set_var("ASHLAR_TEST_B", "y");
        assert_eq!(
            expand_environment_vars("{ASHLAR_TEST_A}/{ASHLAR_TEST_B}"),
            "x/y"
        );
    }
}
