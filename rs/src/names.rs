//! Path-component encoding for branch and script names
//!
//! Branch names such as `feature/login` would otherwise create nested folders
//! under `branches/`. Each name is stored as exactly one path component:
//! `%` becomes `%25` and `/` becomes `%2F`.

/// Encode a branch or script name as a single path component
pub fn encode_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode a path component produced by [`encode_component`]
pub fn decode_component(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    let mut rest = component;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if tail.starts_with("%25") {
            out.push('%');
            rest = &tail[3..];
        } else if tail.starts_with("%2F") || tail.starts_with("%2f") {
            out.push('/');
            rest = &tail[3..];
        } else if tail.starts_with("%5C") || tail.starts_with("%5c") {
            out.push('\\');
            rest = &tail[3..];
        } else {
            out.push('%');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_unchanged() {
        assert_eq!(encode_component("main"), "main");
        assert_eq!(decode_component("main"), "main");
    }

    #[test]
    fn test_slash_is_single_component() {
        let encoded = encode_component("feature/login");
        assert_eq!(encoded, "feature%2Flogin");
        assert!(!encoded.contains('/'));
        assert_eq!(decode_component(&encoded), "feature/login");
    }

    #[test]
    fn test_percent_survives() {
        let name = "100%/done";
        assert_eq!(decode_component(&encode_component(name)), name);
    }

    #[test]
    fn test_stray_percent_is_literal() {
        assert_eq!(decode_component("50%off"), "50%off");
    }
}
