//! JVM option merging for `jvm.config`.

use trino_core::literals::DEFAULT_JVM_OPTIONS;

/// The identity of an option: two options with the same key configure
/// the same JVM setting.
fn option_key(option: &str) -> &str {
    for prefix in ["-Xmx", "-Xms", "-Xss"] {
        if option.starts_with(prefix) {
            return prefix;
        }
    }
    if let Some(rest) = option.strip_prefix("-XX:") {
        let name = rest.trim_start_matches(['+', '-']);
        return name.split_once('=').map_or(name, |(n, _)| n);
    }
    if option.starts_with("-D") {
        return option.split_once('=').map_or(option, |(k, _)| k);
    }
    option
}

/// Merge `additional` (whitespace separated) over the default options.
///
/// An additional option replaces the default with the same key in place;
/// options with new keys are appended in the order given.
pub fn merge_jvm_options(additional: Option<&str>) -> Vec<String> {
    let mut options: Vec<String> = DEFAULT_JVM_OPTIONS.iter().map(|o| o.to_string()).collect();
    for extra in additional.unwrap_or_default().split_whitespace() {
        let key = option_key(extra);
        match options.iter_mut().find(|o| option_key(o) == key) {
            Some(existing) => *existing = extra.to_string(),
            None => options.push(extra.to_string()),
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_keys() {
        assert_eq!(option_key("-Xmx4G"), "-Xmx");
        assert_eq!(option_key("-XX:+ExitOnOutOfMemoryError"), "ExitOnOutOfMemoryError");
        assert_eq!(option_key("-XX:-ExitOnOutOfMemoryError"), "ExitOnOutOfMemoryError");
        assert_eq!(option_key("-XX:MaxRAMPercentage=50"), "MaxRAMPercentage");
        assert_eq!(option_key("-Dfile.encoding=UTF-8"), "-Dfile.encoding");
        assert_eq!(option_key("-server"), "-server");
    }

    #[test]
    fn test_defaults_without_additional() {
        assert_eq!(merge_jvm_options(None), DEFAULT_JVM_OPTIONS.to_vec());
        assert_eq!(merge_jvm_options(Some("  ")), DEFAULT_JVM_OPTIONS.to_vec());
    }

    #[test]
    fn test_override_in_place_and_append() {
        let merged = merge_jvm_options(Some("-Xmx8G -XX:MaxRAMPercentage=50 -Dfoo=bar"));
        assert_eq!(merged[1], "-Xmx8G");
        assert!(merged.contains(&"-XX:MaxRAMPercentage=50".to_string()));
        assert!(!merged.contains(&"-XX:MaxRAMPercentage=80".to_string()));
        assert_eq!(merged.last().map(String::as_str), Some("-Dfoo=bar"));
        assert_eq!(merged.len(), DEFAULT_JVM_OPTIONS.len() + 1);
    }

    #[test]
    fn test_flag_toggle_replaces_default() {
        let merged = merge_jvm_options(Some("-XX:-ExplicitGCInvokesConcurrent"));
        assert!(merged.contains(&"-XX:-ExplicitGCInvokesConcurrent".to_string()));
        assert!(!merged.contains(&"-XX:+ExplicitGCInvokesConcurrent".to_string()));
    }
}
