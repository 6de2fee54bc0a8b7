//! INI-style repository configuration: `[core]`, `[user]`,
//! `[remote "origin"]`, `[branch "main"]` sections with `key = value`
//! pairs, loaded from and saved to `<git-dir>/config`.

use std::{fs, path::Path};

use crate::errors::GitError;

/// One `[section]` or `[section "subsection"]` block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    subsection: Option<String>,
    entries: Vec<(String, String)>,
}

impl Section {
    fn matches(&self, name: &str, subsection: Option<&str>) -> bool {
        self.name.eq_ignore_ascii_case(name) && self.subsection.as_deref() == subsection
    }
}

/// Parsed configuration file, preserving section and key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: Vec<Section>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Load from disk; a missing file is an empty configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, GitError> {
        let content = match fs::read_to_string(path.as_ref()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::new()),
            Err(e) => return Err(GitError::IOError(e)),
        };
        Config::from_str_content(&content)
    }

    pub fn from_str_content(content: &str) -> Result<Config, GitError> {
        let mut config = Config::new();
        let mut current: Option<Section> = None;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if let Some(section) = current.take() {
                    config.sections.push(section);
                }
                let header = header.trim();
                let (name, subsection) = match header.split_once(' ') {
                    Some((name, rest)) => {
                        let sub = rest
                            .trim()
                            .strip_prefix('"')
                            .and_then(|r| r.strip_suffix('"'))
                            .ok_or_else(|| {
                                GitError::InvalidArgument(format!(
                                    "config line {}: malformed subsection",
                                    lineno + 1
                                ))
                            })?;
                        (name.to_string(), Some(sub.to_string()))
                    }
                    None => (header.to_string(), None),
                };
                current = Some(Section {
                    name: name.to_ascii_lowercase(),
                    subsection,
                    entries: Vec::new(),
                });
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                GitError::InvalidArgument(format!("config line {}: missing `=`", lineno + 1))
            })?;
            let section = current.as_mut().ok_or_else(|| {
                GitError::InvalidArgument(format!(
                    "config line {}: key outside any section",
                    lineno + 1
                ))
            })?;
            section.entries.push((
                key.trim().to_ascii_lowercase(),
                value.trim().to_string(),
            ));
        }
        if let Some(section) = current.take() {
            config.sections.push(section);
        }
        Ok(config)
    }

    /// Serialize back to the file form (`key = value`, tab-indented).
    pub fn to_string_content(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            match &section.subsection {
                Some(sub) => out.push_str(&format!("[{} \"{}\"]\n", section.name, sub)),
                None => out.push_str(&format!("[{}]\n", section.name)),
            }
            for (key, value) in &section.entries {
                out.push_str(&format!("\t{key} = {value}\n"));
            }
        }
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GitError> {
        fs::write(path.as_ref(), self.to_string_content())?;
        Ok(())
    }

    /// Last value wins, matching Git's lookup semantics.
    pub fn get(&self, section: &str, subsection: Option<&str>, key: &str) -> Option<String> {
        let key = key.to_ascii_lowercase();
        self.sections
            .iter()
            .filter(|s| s.matches(section, subsection))
            .flat_map(|s| s.entries.iter())
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .next_back()
    }

    pub fn get_bool(&self, section: &str, subsection: Option<&str>, key: &str) -> Option<bool> {
        self.get(section, subsection, key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "on" | "1"))
    }

    /// Insert or replace a key, creating the section if needed.
    pub fn set(&mut self, section: &str, subsection: Option<&str>, key: &str, value: &str) {
        let key = key.to_ascii_lowercase();
        if let Some(s) = self
            .sections
            .iter_mut()
            .find(|s| s.matches(section, subsection))
        {
            if let Some(entry) = s.entries.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value.to_string();
            } else {
                s.entries.push((key, value.to_string()));
            }
        } else {
            self.sections.push(Section {
                name: section.to_ascii_lowercase(),
                subsection: subsection.map(str::to_string),
                entries: vec![(key, value.to_string())],
            });
        }
    }

    /// Remove a key; empty sections are kept (harmless on re-read).
    pub fn unset(&mut self, section: &str, subsection: Option<&str>, key: &str) {
        let key = key.to_ascii_lowercase();
        for s in self
            .sections
            .iter_mut()
            .filter(|s| s.matches(section, subsection))
        {
            s.entries.retain(|(k, _)| *k != key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[core]
	repositoryformatversion = 0
	filemode = true
	bare = false
[user]
	name = Ada
	email = ada@x
[remote "origin"]
	url = https://example.com/repo.git
	fetch = +refs/heads/*:refs/remotes/origin/*
[branch "main"]
	remote = origin
	merge = refs/heads/main
"#;

    #[test]
    fn test_parse_and_get() {
        let config = Config::from_str_content(SAMPLE).unwrap();
        assert_eq!(
            config.get("core", None, "repositoryformatversion").unwrap(),
            "0"
        );
        assert_eq!(config.get_bool("core", None, "filemode"), Some(true));
        assert_eq!(config.get_bool("core", None, "bare"), Some(false));
        assert_eq!(config.get("user", None, "name").unwrap(), "Ada");
        assert_eq!(
            config.get("remote", Some("origin"), "url").unwrap(),
            "https://example.com/repo.git"
        );
        assert_eq!(
            config.get("branch", Some("main"), "merge").unwrap(),
            "refs/heads/main"
        );
        assert_eq!(config.get("user", None, "missing"), None);
        assert_eq!(config.get("remote", Some("upstream"), "url"), None);
    }

    #[test]
    fn test_set_and_round_trip() {
        let mut config = Config::from_str_content(SAMPLE).unwrap();
        config.set("user", None, "name", "Grace");
        config.set("extensions", None, "objectformat", "sha256");

        let rendered = config.to_string_content();
        let reparsed = Config::from_str_content(&rendered).unwrap();
        assert_eq!(reparsed.get("user", None, "name").unwrap(), "Grace");
        assert_eq!(
            reparsed.get("extensions", None, "objectformat").unwrap(),
            "sha256"
        );
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let content = "# top comment\n[core]\n; semicolon comment\n\tbare = false\n\n";
        let config = Config::from_str_content(content).unwrap();
        assert_eq!(config.get_bool("core", None, "bare"), Some(false));
    }

    #[test]
    fn test_key_outside_section_rejected() {
        assert!(Config::from_str_content("orphan = 1\n").is_err());
    }
}
