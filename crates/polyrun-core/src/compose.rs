//! Composition of learner code with a validation script.
//!
//! The validation script is appended to the learner's code and the result is
//! handed to a backend as a single program. The composed text is built fresh
//! for every run.
//!
//! For compiled languages the validation script carries the real `main`, so
//! the learner's own `main` is renamed out of the way first. The rename is a
//! textual substitution, not a parse: it only recognises `int main(` with
//! arbitrary whitespace, and misses forms like `int /* c */ main(`,
//! `signed main(`, or a `main` produced by a macro.

use regex::Regex;
use std::sync::LazyLock;

/// Marker placed between learner code and the validation script in
/// compiled-language sources.
pub const VALIDATION_SEPARATOR: &str = "//--- Validation Script ---";

/// Name the learner's entry point is renamed to.
pub const DISABLED_ENTRY_POINT: &str = "__user_main_disabled";

static ENTRY_POINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bint\s+main\s*\(").expect("entry point pattern is valid"));

/// Rename every `int main(` in `code` to the disabled entry point.
pub fn neutralize_entry_point(code: &str) -> String {
    ENTRY_POINT
        .replace_all(code, format!("int {}(", DISABLED_ENTRY_POINT))
        .into_owned()
}

/// Count definitions of `int main(` in `source`.
pub fn entry_point_count(source: &str) -> usize {
    ENTRY_POINT.find_iter(source).count()
}

/// Compose a script-language program: code, newline, validation script.
pub fn compose_script(code: &str, validation_script: Option<&str>) -> String {
    match validation_script {
        Some(validation) => format!("{}\n{}", code, validation),
        None => code.to_string(),
    }
}

/// Compose a compiled-language translation unit.
///
/// Without a validation script the learner code is returned unchanged.
pub fn compose_compiled(code: &str, validation_script: Option<&str>) -> String {
    match validation_script {
        Some(validation) => format!(
            "{}\n{}\n{}",
            neutralize_entry_point(code),
            VALIDATION_SEPARATOR,
            validation
        ),
        None => code.to_string(),
    }
}
