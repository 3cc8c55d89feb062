//! Preset discovery for the HandBrakeCLI front-ends.
//!
//! Everything here is heuristic and sits outside the batch runner: the runner
//! only ever receives a preset identifier string.

use crate::encode::handbrake::{PRESET_IMPORT_FLAG, PRESET_LIST_FLAG};
use crate::encode::run_with_merged_output;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Object keys checked first, in order, when looking for a default preset name
const PRESET_NAME_KEYS: &[&str] = &["preset", "preset_name", "name", "PresetName", "Name", "Preset"];

/// Words that mark a line as a header rather than a preset in the fallback parse
const NON_PRESET_WORDS: &[&str] = &["preset", "handbrake"];

/// Errors from listing presets.
#[derive(Debug, Error)]
pub enum PresetError {
    /// The encoder could not be started
    #[error("Could not run {} to list presets: {source}", executable.display())]
    EncoderNotFound {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The preset listing was empty or unrecognizable
    #[error("No presets found in encoder output")]
    NoPresets,
}

/// Extract preset names from `--preset-list` output.
///
/// Indented lines are presets and lines ending in `:` are category headers.
/// When no indented line qualifies, every non-blank line that does not look
/// like a header is taken instead.
pub fn parse_preset_list(text: &str) -> Vec<String> {
    let presets: Vec<String> = text
        .lines()
        .filter(|line| line.starts_with(' ') || line.starts_with('\t'))
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(String::from)
        .collect();

    if !presets.is_empty() {
        return presets;
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_lowercase();
            !NON_PRESET_WORDS.iter().any(|word| lower.contains(word))
        })
        .map(String::from)
        .collect()
}

/// Build the command that lists presets, importing `presets_file` first.
pub fn build_preset_list_command(executable: &Path, presets_file: Option<&Path>) -> Command {
    let mut cmd = Command::new(executable);
    if let Some(file) = presets_file {
        cmd.arg(PRESET_IMPORT_FLAG).arg(file);
    }
    cmd.arg(PRESET_LIST_FLAG);
    cmd
}

/// Ask the encoder for its presets, including any from `presets_file`.
///
/// The exit status is ignored; HandBrakeCLI prints the list to stderr and
/// some builds exit non-zero after listing.
pub fn discover_presets(
    executable: &Path,
    presets_file: Option<&Path>,
) -> Result<Vec<String>, PresetError> {
    let cmd = build_preset_list_command(executable, presets_file);
    let result = run_with_merged_output(cmd).map_err(|source| PresetError::EncoderNotFound {
        executable: executable.to_path_buf(),
        source,
    })?;

    let presets = parse_preset_list(&result.output);
    if presets.is_empty() {
        return Err(PresetError::NoPresets);
    }
    log::info!("Loaded {} presets from {}", presets.len(), executable.display());
    Ok(presets)
}

/// Best-guess default preset name stored in a presets JSON file.
///
/// Returns `None` if the file cannot be read or parsed, or holds no usable string.
pub fn default_preset_name(path: &Path) -> Option<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::debug!("Could not read presets JSON {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Value>(&contents) {
        Ok(value) => find_preset_name(&value),
        Err(e) => {
            log::debug!("Could not parse presets JSON {}: {}", path.display(), e);
            None
        }
    }
}

/// Depth-first search for the first plausible preset name in `value`.
pub fn find_preset_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Object(map) => PRESET_NAME_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_blank))
            .or_else(|| map.values().find_map(find_preset_name)),
        Value::Array(items) => items.iter().find_map(find_preset_name),
        _ => None,
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Presets offered to the user and the one picked by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetSelection {
    pub presets: Vec<String>,
    pub selected: String,
}

/// Pick the default preset out of `presets`.
///
/// A default matching a listed preset case-insensitively selects the listed
/// spelling. An unlisted default is put at the top and selected. Without a
/// default the first preset wins.
pub fn select_preset(mut presets: Vec<String>, default: Option<&str>) -> Option<PresetSelection> {
    let default = default.map(str::trim).filter(|d| !d.is_empty());

    let selected = match default {
        Some(wanted) => {
            let wanted_lower = wanted.to_lowercase();
            match presets
                .iter()
                .find(|p| p.trim().to_lowercase() == wanted_lower)
            {
                Some(listed) => listed.clone(),
                None => {
                    presets.insert(0, wanted.to_string());
                    wanted.to_string()
                }
            }
        }
        None => presets.first()?.clone(),
    };

    Some(PresetSelection { presets, selected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    const SAMPLE_LIST: &str = "\
[12:00:01] hb_init: starting libhb thread
General/
    Very Fast 1080p30
        Small H.264 video (up to 1080p30) and AAC stereo audio, in an MP4 container.
    Fast 1080p30
Custom/:
    My Anime Preset
";

    #[test]
    fn test_parse_indented_presets() {
        let text = "General/:\n    Fast 1080p30\n    HQ 720p30 Surround\n\nWeb/:\n\tDiscord Nitro\n";
        assert_eq!(
            parse_preset_list(text),
            vec!["Fast 1080p30", "HQ 720p30 Surround", "Discord Nitro"]
        );
    }

    #[test]
    fn test_parse_skips_indented_headers() {
        let text = "  Category:\n  Preset One\n";
        assert_eq!(parse_preset_list(text), vec!["Preset One"]);
    }

    #[test]
    fn test_parse_keeps_description_lines() {
        // Descriptions are indented too; the heuristic does not tell them apart
        let presets = parse_preset_list(SAMPLE_LIST);
        assert_eq!(presets.len(), 4);
        assert_eq!(presets[0], "Very Fast 1080p30");
        assert_eq!(presets[3], "My Anime Preset");
    }

    #[test]
    fn test_parse_fallback_without_indentation() {
        let text = "HandBrake 1.7.2\nAvailable presets:\nFast 1080p30\nSuper HQ 2160p60\n";
        assert_eq!(
            parse_preset_list(text),
            vec!["Fast 1080p30", "Super HQ 2160p60"]
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_preset_list("").is_empty());
        assert!(parse_preset_list("HandBrake has exited.\n").is_empty());
    }

    #[test]
    fn test_list_command_arguments() {
        let cmd = build_preset_list_command(
            Path::new("HandBrakeCLI"),
            Some(Path::new("/cfg/presets.json")),
        );
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["--preset-import-file", "/cfg/presets.json", "--preset-list"]
        );

        let cmd = build_preset_list_command(Path::new("HandBrakeCLI"), None);
        assert_eq!(cmd.get_args().count(), 1);
    }

    #[test]
    fn test_discover_missing_encoder() {
        let err = discover_presets(Path::new("/nonexistent/HandBrakeCLI"), None).unwrap_err();
        assert!(matches!(err, PresetError::EncoderNotFound { .. }));
    }

    #[test]
    fn test_find_name_prefers_known_keys() {
        let value = json!({
            "VersionMajor": "56",
            "PresetList": [{ "PresetName": "My Anime Preset", "Type": 1 }],
            "name": "  Top Level  "
        });
        assert_eq!(find_preset_name(&value), Some("Top Level".to_string()));
    }

    #[test]
    fn test_find_name_key_order() {
        let value = json!({ "Name": "second", "preset_name": "first" });
        assert_eq!(find_preset_name(&value), Some("first".to_string()));
    }

    #[test]
    fn test_find_name_depth_first() {
        let value = json!({
            "PresetList": [{ "Folder": false, "PresetName": "Nested Preset" }],
            "VersionMajor": "56"
        });
        assert_eq!(find_preset_name(&value), Some("Nested Preset".to_string()));
    }

    #[test]
    fn test_find_name_falls_back_to_first_string() {
        let value = json!({ "Version": 56, "Tags": ["", "  ", "x265 10-bit"] });
        assert_eq!(find_preset_name(&value), Some("x265 10-bit".to_string()));
    }

    #[test]
    fn test_find_name_ignores_non_string_keys() {
        let value = json!({ "name": 5, "Preset": { "label": "Inner" } });
        assert_eq!(find_preset_name(&value), Some("Inner".to_string()));
        assert_eq!(find_preset_name(&json!([1, 2, null, true])), None);
    }

    #[test]
    fn test_default_preset_name_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("presets.json");
        fs::write(
            &path,
            r#"{"PresetList":[{"PresetName":"Film 1080p","VideoEncoder":"x265"}],"VersionMajor":56}"#,
        )
        .unwrap();
        assert_eq!(default_preset_name(&path), Some("Film 1080p".to_string()));
    }

    #[test]
    fn test_default_preset_name_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(default_preset_name(&temp_dir.path().join("missing.json")), None);

        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(default_preset_name(&path), None);
    }

    fn presets(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_select_matching_default_keeps_listed_spelling() {
        let selection =
            select_preset(presets(&["Fast 1080p30", "My Anime Preset"]), Some("my anime preset"))
                .unwrap();
        assert_eq!(selection.selected, "My Anime Preset");
        assert_eq!(selection.presets.len(), 2);
    }

    #[test]
    fn test_select_unlisted_default_goes_first() {
        let selection = select_preset(presets(&["Fast 1080p30"]), Some("Custom")).unwrap();
        assert_eq!(selection.selected, "Custom");
        assert_eq!(selection.presets, presets(&["Custom", "Fast 1080p30"]));
    }

    #[test]
    fn test_select_without_default() {
        let selection = select_preset(presets(&["Fast 1080p30", "HQ"]), None).unwrap();
        assert_eq!(selection.selected, "Fast 1080p30");

        let selection = select_preset(presets(&["Fast 1080p30"]), Some("   ")).unwrap();
        assert_eq!(selection.selected, "Fast 1080p30");

        assert_eq!(select_preset(Vec::new(), None), None);
    }

    #[test]
    fn test_select_default_with_empty_list() {
        let selection = select_preset(Vec::new(), Some("Only")).unwrap();
        assert_eq!(selection.presets, presets(&["Only"]));
    }

    // *For any* preset names indented under a header, parsing SHALL return exactly
    // those names in order.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_indented_names_round_trip(
            names in proptest::collection::vec("[A-Za-z0-9][A-Za-z0-9 ]{0,20}[A-Za-z0-9]", 1..8),
            indent in prop_oneof![Just("    "), Just("\t"), Just("  ")],
        ) {
            let mut text = String::from("General/:\n");
            for name in &names {
                text.push_str(indent);
                text.push_str(name);
                text.push('\n');
            }
            prop_assert_eq!(parse_preset_list(&text), names);
        }

        #[test]
        fn prop_selection_is_listed(
            names in proptest::collection::vec("[A-Za-z]{1,10}", 1..6),
            default in proptest::option::of("[A-Za-z]{1,10}"),
        ) {
            let selection = select_preset(names.clone(), default.as_deref()).unwrap();
            prop_assert!(selection.presets.contains(&selection.selected));
            prop_assert!(selection.presets.len() >= names.len());
            prop_assert!(selection.presets.len() <= names.len() + 1);
        }
    }
}
