use crate::domain::CommandOption;
use std::collections::BTreeMap;

pub type OptionValues = BTreeMap<String, String>;

pub const TRUE_VALUE: &str = "true";
pub const FALSE_VALUE: &str = "false";

/// Values written when an options screen opens: every non-empty default.
pub fn seed_option_values(options: &[CommandOption]) -> OptionValues {
    options
        .iter()
        .filter(|option| !option.default_value.is_empty())
        .map(|option| (option.flag.clone(), option.default_value.clone()))
        .collect()
}

/// Builds the argument vector for `options` in schema order.
///
/// Bool options emit a bare `--flag` only when the stored value is `"true"`.
/// String and int options emit `--flag value` when the value is non-empty and
/// are skipped otherwise. Values are passed through unvalidated.
pub fn build_args(options: &[CommandOption], values: &OptionValues) -> Vec<String> {
    let mut args = Vec::new();

    for option in options {
        let value = values.get(&option.flag).map(String::as_str).unwrap_or("");
        if option.is_bool() {
            if value == TRUE_VALUE {
                args.push(format!("--{}", option.flag));
            }
        } else if !value.is_empty() {
            args.push(format!("--{}", option.flag));
            args.push(value.to_string());
        }
    }

    args
}

pub fn toggled(value: Option<&str>) -> &'static str {
    if value == Some(TRUE_VALUE) {
        FALSE_VALUE
    } else {
        TRUE_VALUE
    }
}
