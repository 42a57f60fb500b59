//! Identifier quoting helpers shared by the Repository and Schema Catalog.

/// Quote a single identifier, doubling embedded quote characters.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a dotted identifier path (`schema.table`) segment by segment.
pub fn quote_ident_path(path: &str) -> String {
    path.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_escapes() {
        assert_eq!(quote_ident("people"), "\"people\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn quotes_dotted_paths() {
        assert_eq!(quote_ident_path("dbo.people"), "\"dbo\".\"people\"");
    }
}
