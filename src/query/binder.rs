//! Placeholder binding for query templates.
//!
//! Template bodies name their inputs with `:identifier` placeholders. Binding
//! rewrites each placeholder that has a supplied value into the backend's own
//! bind marker and collects the values separately, so caller text never
//! becomes part of the statement.

use crate::db::{BoundStatement, DatabaseBackend, Parameters, PlaceholderStyle};
use crate::error::{StencilError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern is valid")
    })
}

/// Yields `(start, end, name)` for every placeholder in `body`.
///
/// The identifier match is greedy, so `:id` never matches inside
/// `:identifier`. A colon preceded by another colon is a cast (`x::text`),
/// not a placeholder.
fn scan(body: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    placeholder_pattern()
        .captures_iter(body)
        .filter_map(move |caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            if body[..whole.start()].ends_with(':') {
                return None;
            }
            Some((whole.start(), whole.end(), name.as_str()))
        })
}

/// Returns the distinct placeholder names in `body`, in order of first use.
pub fn placeholders(body: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (_, _, name) in scan(body) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Binds `parameters` into `body` for the given backend.
///
/// Placeholders without a supplied value stay in the text untouched; the
/// backend reports them when the statement runs. Supplied values whose name
/// never appears in the body are ignored.
pub fn bind(body: &str, parameters: &Parameters, backend: DatabaseBackend) -> Result<BoundStatement> {
    let style = backend.placeholder_style();
    let mut sql = String::with_capacity(body.len());
    let mut params = Vec::new();
    let mut numbered: HashMap<&str, usize> = HashMap::new();
    let mut cursor = 0;

    for (start, end, name) in scan(body) {
        let Some(value) = parameters.get(name) else {
            continue;
        };

        sql.push_str(&body[cursor..start]);
        match style {
            PlaceholderStyle::Numbered => {
                let index = match numbered.get(name) {
                    Some(index) => *index,
                    None => {
                        params.push(value.clone());
                        numbered.insert(name, params.len());
                        params.len()
                    }
                };
                sql.push('$');
                sql.push_str(&index.to_string());
            }
            PlaceholderStyle::Positional => {
                params.push(value.clone());
                sql.push('?');
            }
        }
        cursor = end;
    }
    sql.push_str(&body[cursor..]);

    if params.len() > backend.max_bind_params() {
        return Err(StencilError::binding(format!(
            "Statement needs {} bind parameters but {} allows at most {}",
            params.len(),
            backend.as_str(),
            backend.max_bind_params()
        )));
    }

    Ok(BoundStatement { sql, params })
}
