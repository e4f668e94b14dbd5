//! Turns struct doc comments into TOML comments for generated config files.

use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{ArrayOfTables, Decor, Item, RawString, Table};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Renders documentation as `#`-prefixed TOML comment lines.
fn doc_comment(docs: &str) -> String {
    docs.lines()
        .map(|line| {
            if line.is_empty() {
                "#\n".to_string()
            } else {
                format!("# {line}\n")
            }
        })
        .collect()
}

/// Appends `docs` to whatever comment prefix `decor` already carries.
///
/// A blank `#` line separates existing comments from the new block.
pub fn append_docs(decor: &mut Decor, docs: &str) {
    let comments = doc_comment(docs);
    let existing = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default();

    let prefix = match existing.lines().last() {
        None => comments,
        Some("") => format!("{existing}{comments}"),
        Some(_) => format!("{existing}#\n{comments}"),
    };
    decor.set_prefix(prefix);
}

/// Annotates each key of `table` with the field docs of `T`.
///
/// Nested tables get the container docs of `T` unless `is_root` is set.
pub fn annotate_table<T>(table: &mut Table, is_root: bool) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if !is_root {
        append_docs(table.decor_mut(), T::DOCS);
    }

    for (mut key, item) in table.iter_mut() {
        let name = key.get().to_string();
        let Ok(docs) = T::get_field_docs(&name) else {
            debug!(
                "no documentation for field '{}' on '{}'",
                name,
                type_name::<T>()
            );
            continue;
        };

        match item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(name)),
            Item::Value(_) => append_docs(key.leaf_decor_mut(), docs),
            Item::Table(sub_table) => append_docs(sub_table.decor_mut(), docs),
            Item::ArrayOfTables(array) => {
                if let Some(first) = array.iter_mut().next() {
                    append_docs(first.decor_mut(), docs);
                }
            }
        }
    }

    Ok(())
}

/// Annotates the first table of an array of tables; the rest share its shape.
pub fn annotate_array_of_tables<T>(array: &mut ArrayOfTables) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if let Some(first) = array.iter_mut().next() {
        annotate_table::<T>(first, false)
            .map_err(|err| ConfigError::AnnotateFirstTable(err.to_string()))?;
    }
    Ok(())
}
