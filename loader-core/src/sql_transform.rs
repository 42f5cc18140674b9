//! Line/statement-oriented rewrite of DDL statements.
//!
//! A transform is `Fn(&str) -> String`; the default pipeline applies each
//! transform to one already-split statement at a time, never to a whole
//! script — this is what keeps "strip sql_mode" from reaching inside a
//! string literal that merely contains the text `SET sql_mode=...`.

use once_cell::sync::Lazy;
use regex::Regex;

use loader_types::DeferIndexMode;

static SQL_MODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(\s*(?:/\*!\d+\s*)?SET\s+(?:SESSION\s+|GLOBAL\s+|@@(?:SESSION\.|GLOBAL\.)?)?sql_mode\s*=\s*)'([^']*)'(\s*(?:\*/)?\s*;?\s*)$")
        .unwrap()
});

/// Removes `NO_AUTO_CREATE_USER` from a `SET sql_mode = '...'` statement's
/// comma-separated value list, preserving surrounding spacing. Statements
/// that are not themselves a `sql_mode` assignment (including ones that
/// merely *contain* such text inside a string literal, e.g. an entire
/// `SELECT '...'` statement) are returned unchanged. Idempotent: running
/// it twice is the same as running it once, since a second pass finds no
/// more occurrences of the removed mode.
pub fn strip_removed_sql_modes(stmt: &str) -> String {
    let Some(caps) = SQL_MODE_RE.captures(stmt) else {
        return stmt.to_string();
    };
    let prefix = &caps[1];
    let modes = &caps[2];
    let suffix = &caps[3];

    let filtered: Vec<&str> = modes
        .split(',')
        .filter(|m| !m.trim().eq_ignore_ascii_case("NO_AUTO_CREATE_USER"))
        .collect();

    format!("{prefix}'{}'{suffix}", filtered.join(","))
}

/// Splits a non-quoted, non-parenthesized comma list at top level,
/// respecting nested parens, quotes and backtick-quoted identifiers.
/// Used to pull individual column/key/constraint definitions out of a
/// `CREATE TABLE (...)` body.
fn split_top_level(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' && q != '`' {
                    if let Some(&next) = chars.peek() {
                        current.push(next);
                        chars.next();
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    items.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

/// Finds the outermost `(...)` of a `CREATE TABLE name (...)` statement and
/// returns `(prefix, inner_body, suffix)`.
fn split_create_table(ddl: &str) -> Option<(&str, &str, &str)> {
    let open = ddl.find('(')?;
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut close = None;
    let bytes = ddl.as_bytes();
    let mut i = open;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match quote {
            Some(q) => {
                if c == '\\' && q != '`' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    let close = close?;
    Some((&ddl[..open + 1], &ddl[open + 1..close], &ddl[close..]))
}

fn is_foreign_key_item(item: &str) -> bool {
    let upper = item.trim_start().to_ascii_uppercase();
    upper.starts_with("FOREIGN KEY") || (upper.starts_with("CONSTRAINT") && upper.contains("FOREIGN KEY"))
}

fn is_fulltext_index_item(item: &str) -> bool {
    item.trim_start().to_ascii_uppercase().starts_with("FULLTEXT")
}

fn is_secondary_index_item(item: &str) -> bool {
    let upper = item.trim_start().to_ascii_uppercase();
    if upper.starts_with("PRIMARY KEY") {
        return false;
    }
    upper.starts_with("KEY ")
        || upper.starts_with("KEY(")
        || upper.starts_with("INDEX ")
        || upper.starts_with("INDEX(")
        || (upper.starts_with("UNIQUE") && !upper.starts_with("UNIQUE KEY `PRIMARY`"))
}

/// Result of extracting deferred index DDL from one `CREATE TABLE`
/// statement: the rewritten DDL that is actually
/// executed first, the `ALTER TABLE ... ADD ...` statements for indexes
/// deferred per `mode`, and the foreign key `ALTER TABLE` statements
/// (always deferred, replayed at `on_schema_end`).
pub struct DeferredIndexes {
    pub rewritten_ddl: String,
    pub deferred_index_statements: Vec<String>,
    pub deferred_fk_statements: Vec<String>,
}

/// Textually scans a `CREATE TABLE` statement's column/key list, pulling
/// out index and foreign-key definitions into separate `ALTER TABLE`
/// statements so the table can be created without them and the indexes
/// added back after bulk load.
pub fn extract_deferred_indexes(ddl: &str, table_quoted: &str, mode: DeferIndexMode) -> DeferredIndexes {
    let Some((prefix, inner, suffix)) = split_create_table(ddl) else {
        return DeferredIndexes {
            rewritten_ddl: ddl.to_string(),
            deferred_index_statements: Vec::new(),
            deferred_fk_statements: Vec::new(),
        };
    };

    let items = split_top_level(inner);
    let mut kept = Vec::new();
    let mut deferred_index_statements = Vec::new();
    let mut deferred_fk_statements = Vec::new();

    for item in items {
        if is_foreign_key_item(&item) {
            deferred_fk_statements.push(format!("ALTER TABLE {table_quoted} ADD {item}"));
            continue;
        }
        let defer_as_index = match mode {
            DeferIndexMode::Off => false,
            DeferIndexMode::All => is_secondary_index_item(&item) || is_fulltext_index_item(&item),
            DeferIndexMode::Fulltext => is_fulltext_index_item(&item),
        };
        if defer_as_index {
            deferred_index_statements.push(format!("ALTER TABLE {table_quoted} ADD {item}"));
            continue;
        }
        kept.push(item);
    }

    let rewritten_ddl = format!("{prefix}\n  {}\n{suffix}", kept.join(",\n  "));

    DeferredIndexes {
        rewritten_ddl,
        deferred_index_statements,
        deferred_fk_statements,
    }
}

/// Splits a DDL script into individual statements, tracking `DELIMITER`
/// directives (as `mysqldump` emits around trigger bodies) and treating
/// `/*!NNNNN ... */` version-guarded comments as part of the statement
/// they annotate rather than as a delimiter boundary.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut delimiter = ";".to_string();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_comment = false;

    for line in script.lines() {
        let trimmed = line.trim();
        if !in_comment && quote.is_none() {
            if let Some(rest) = trimmed.strip_prefix("DELIMITER ") {
                delimiter = rest.trim().to_string();
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("delimiter ") {
                delimiter = rest.trim().to_string();
                continue;
            }
        }

        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if in_comment {
                current.push(c);
                if c == '*' && chars.peek() == Some(&'/') {
                    current.push('/');
                    chars.next();
                    in_comment = false;
                }
                continue;
            }
            match quote {
                Some(q) => {
                    current.push(c);
                    if c == '\\' && q != '`' {
                        if let Some(&next) = chars.peek() {
                            current.push(next);
                            chars.next();
                        }
                    } else if c == q {
                        quote = None;
                    }
                }
                None => {
                    if c == '\'' || c == '"' || c == '`' {
                        quote = Some(c);
                        current.push(c);
                    } else if c == '/' && chars.peek() == Some(&'*') {
                        current.push(c);
                        current.push('*');
                        chars.next();
                        in_comment = true;
                    } else if check_delimiter_match(c, &delimiter, &mut chars) {
                        let stmt = current.trim();
                        if !stmt.is_empty() {
                            statements.push(stmt.to_string());
                        }
                        current.clear();
                    } else {
                        current.push(c);
                    }
                }
            }
        }
        current.push('\n');
    }

    let stmt = current.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
    statements
}

/// Checks whether `c` plus however many subsequent characters are needed
/// completes `delimiter`, consuming them from `chars` if so.
fn check_delimiter_match(
    c: char,
    delimiter: &str,
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> bool {
    let mut delim_chars = delimiter.chars();
    if delim_chars.next() != Some(c) {
        return false;
    }
    let rest: String = delim_chars.collect();
    for expected in rest.chars() {
        match chars.peek() {
            Some(&next) if next == expected => {
                chars.next();
            }
            // A rare partial match against a multi-character delimiter is
            // treated as ordinary text rather than re-queued, since
            // `Peekable` cannot push characters back.
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_removed_mode_from_middle_of_list() {
        let out = strip_removed_sql_modes(
            "SET sql_mode='ANSI_QUOTES,NO_AUTO_CREATE_USER,NO_ZERO_DATE'",
        );
        assert_eq!(out, "SET sql_mode='ANSI_QUOTES,NO_ZERO_DATE'");
    }

    #[test]
    fn strips_to_empty_string_not_dropped() {
        let out = strip_removed_sql_modes("SET sql_mode='NO_AUTO_CREATE_USER'");
        assert_eq!(out, "SET sql_mode=''");
    }

    #[test]
    fn leaves_string_literal_containing_text_untouched() {
        let input = r#"SELECT 'SET sql_mode=\'NO_AUTO_CREATE_USER\''"#;
        assert_eq!(strip_removed_sql_modes(input), input);
    }

    #[test]
    fn is_idempotent() {
        let once = strip_removed_sql_modes(
            "SET sql_mode='ANSI_QUOTES,NO_AUTO_CREATE_USER,NO_ZERO_DATE'",
        );
        let twice = strip_removed_sql_modes(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn honors_version_guard_comment() {
        let out = strip_removed_sql_modes("/*!40101 SET sql_mode='NO_AUTO_CREATE_USER' */");
        assert_eq!(out, "/*!40101 SET sql_mode='' */");
    }

    #[test]
    fn splits_simple_statements() {
        let script = "CREATE TABLE t (a int);\nINSERT INTO t VALUES (1);\n";
        let stmts = split_statements(script);
        assert_eq!(stmts, vec!["CREATE TABLE t (a int)", "INSERT INTO t VALUES (1)"]);
    }

    #[test]
    fn semicolon_inside_string_literal_does_not_split() {
        let script = "INSERT INTO t VALUES ('a;b');\n";
        let stmts = split_statements(script);
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('a;b')"]);
    }

    #[test]
    fn delimiter_directive_changes_the_terminator() {
        let script = "DELIMITER ;;\nCREATE TRIGGER trg BEFORE INSERT ON t FOR EACH ROW BEGIN SET @x = 1; END;;\nDELIMITER ;\n";
        let stmts = split_statements(script);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].starts_with("CREATE TRIGGER"));
    }

    #[test]
    fn extracts_secondary_indexes_in_all_mode() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  `name` varchar(32),\n  PRIMARY KEY (`id`),\n  KEY `idx_name` (`name`),\n  FULLTEXT KEY `ft_name` (`name`)\n) ENGINE=InnoDB";
        let result = extract_deferred_indexes(ddl, "`t`", DeferIndexMode::All);
        assert_eq!(result.deferred_index_statements.len(), 2);
        assert!(result.rewritten_ddl.contains("PRIMARY KEY"));
        assert!(!result.rewritten_ddl.contains("idx_name"));
        assert!(!result.rewritten_ddl.contains("ft_name"));
    }

    #[test]
    fn fulltext_mode_keeps_secondary_indexes() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  PRIMARY KEY (`id`),\n  KEY `idx_id` (`id`),\n  FULLTEXT KEY `ft_x` (`id`)\n) ENGINE=InnoDB";
        let result = extract_deferred_indexes(ddl, "`t`", DeferIndexMode::Fulltext);
        assert_eq!(result.deferred_index_statements.len(), 1);
        assert!(result.rewritten_ddl.contains("idx_id"));
        assert!(!result.rewritten_ddl.contains("ft_x"));
    }

    #[test]
    fn foreign_keys_always_deferred() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  `parent_id` int,\n  PRIMARY KEY (`id`),\n  CONSTRAINT `fk_parent` FOREIGN KEY (`parent_id`) REFERENCES `parent` (`id`)\n) ENGINE=InnoDB";
        let result = extract_deferred_indexes(ddl, "`t`", DeferIndexMode::Off);
        assert_eq!(result.deferred_fk_statements.len(), 1);
        assert!(!result.rewritten_ddl.contains("FOREIGN KEY"));
    }
}
