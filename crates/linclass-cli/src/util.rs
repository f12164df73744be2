use std::path::Path;

use anyhow::{Context, Result};
use linclass::config::TrainConfig;

/// Loads a training configuration from a JSON file; missing fields keep their defaults.
pub fn load_train_config<P: AsRef<Path>>(path: P) -> Result<TrainConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: TrainConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}

/// Checks that every input file exists before any of them is read.
pub fn validate_input_files<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!("File does not exist: {}", path.display());
        }
    }
    Ok(())
}

/// Label list separated by commas or whitespace, e.g. `-1,O` or `"-1 O"`.
pub fn split_labels(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_lists_ignore_blanks() {
        assert_eq!(split_labels("O, -1,,"), vec!["O".to_string(), "-1".to_string()]);
        assert!(split_labels("").is_empty());
    }

    #[test]
    fn label_lists_split_on_spaces() {
        assert_eq!(split_labels("-1 O"), vec!["-1".to_string(), "O".to_string()]);
        assert_eq!(
            split_labels("B-NP\tO ,I-NP"),
            vec!["B-NP".to_string(), "O".to_string(), "I-NP".to_string()]
        );
    }
}
