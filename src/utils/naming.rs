// File and object naming for dumps.
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.-]").expect("static pattern is valid"));

/// Replaces every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(name, "_").into_owned()
}

/// `<sanitizedSourceName>_<timestamp>.sql`, with the colons of the timestamp replaced.
pub fn dump_filename(source_name: &str, at: NaiveDateTime) -> String {
    let stamp = at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string().replace(':', "-");
    format!("{}_{}.sql", sanitize_name(source_name), stamp)
}

/// `<sanitizedSourceName>/<yyyy-MM-dd>/<filename>`
pub fn remote_path(source_name: &str, filename: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}/{}",
        sanitize_name(source_name),
        date.format("%Y-%m-%d"),
        filename
    )
}
