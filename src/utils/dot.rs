//! DOT format utilities for graph visualization.
//!
//! Used by the MIR graph exporter; the escaping covers every character
//! that is special inside DOT labels, including the angle brackets that
//! show up in method signatures like `<init>` and `<clinit>`.

/// Escapes a string for safe use in DOT format labels and identifiers.
///
/// # Arguments
///
/// * `s` - The string to escape
///
/// # Returns
///
/// A new string with all special characters properly escaped.
///
/// # Examples
///
/// ```rust,ignore
/// use dexmir::utils::escape_dot;
///
/// let escaped = escape_dot("invoke-direct <init>");
/// assert_eq!(escaped, "invoke-direct \\<init\\>");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
        .replace('<', "\\<")
        .replace('>', "\\>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_mnemonic() {
        assert_eq!(escape_dot("add-int/lit8"), "add-int/lit8");
    }

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape_dot("const-string \"a\\b\""), "const-string \\\"a\\\\b\\\"");
    }

    #[test]
    fn test_escape_newlines() {
        assert_eq!(escape_dot("line1\nline2"), "line1\\nline2");
        assert_eq!(escape_dot("line1\r\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_escape_constructor_names() {
        assert_eq!(escape_dot("<init>"), "\\<init\\>");
        assert_eq!(
            escape_dot("invoke-static <clinit>"),
            "invoke-static \\<clinit\\>"
        );
    }
}
