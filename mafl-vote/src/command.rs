//! Planned external commands
//!
//! A [`PlannedCommand`] is an executable name, an ordered argument vector and
//! the output path it declares. Identity for deduplication is the structured
//! [`CommandKey`], so two commands that would render differently for
//! incidental reasons (path spelling, flag order) still collapse when they
//! describe the same resample.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Structured identity of a command
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandKey {
    /// Resample one atlas/template label volume into target space
    Resample {
        atlas: String,
        template: String,
        target: String,
        inverted: bool,
    },
    /// Fuse a strategy's resampled labels for one target
    Vote { strategy: String, target: String },
    /// Unpack the template label cache
    Extract { archive: PathBuf },
}

/// An external process invocation with its declared output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCommand {
    key: CommandKey,
    program: String,
    args: Vec<String>,
    output: PathBuf,
}

impl PlannedCommand {
    pub fn new(
        key: CommandKey,
        program: impl Into<String>,
        args: Vec<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            key,
            program: program.into(),
            args,
            output: output.into(),
        }
    }

    pub fn key(&self) -> &CommandKey {
        &self.key
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Path the command is expected to write
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Shell-style rendering for logs and failure reports
    pub fn invocation(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Drop repeated keys, keeping the first occurrence and first-seen order
///
/// Returns the unique commands and the number of duplicates removed.
pub fn dedup<I>(commands: I) -> (Vec<PlannedCommand>, usize)
where
    I: IntoIterator<Item = PlannedCommand>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut duplicates = 0;

    for command in commands {
        if seen.insert(command.key.clone()) {
            unique.push(command);
        } else {
            duplicates += 1;
        }
    }

    (unique, duplicates)
}

/// Lossy string form of a path for argument vectors
pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resample(atlas: &str, template: &str, args: &[&str]) -> PlannedCommand {
        PlannedCommand::new(
            CommandKey::Resample {
                atlas: atlas.to_string(),
                template: template.to_string(),
                target: "X".to_string(),
                inverted: false,
            },
            "mincresample",
            args.iter().map(|s| s.to_string()).collect(),
            format!("/ws/labels/{}/{}/X/labels.mnc", atlas, template),
        )
    }

    #[test]
    fn test_invocation_quotes_whitespace() {
        let cmd = resample("A1", "T1", &["-like", "/data/my image.mnc"]);
        assert_eq!(cmd.invocation(), "mincresample -like '/data/my image.mnc'");
    }

    #[test]
    fn test_dedup_by_key_not_string() {
        let first = resample("A1", "T1", &["/a//b.mnc"]);
        let same_key = resample("A1", "T1", &["/a/b.mnc"]);
        let other = resample("A1", "T2", &["/a/b.mnc"]);

        let (unique, removed) = dedup(vec![first.clone(), other.clone(), same_key]);

        assert_eq!(unique, vec![first, other]);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_inverted_flag_is_part_of_identity() {
        let plain = resample("A1", "T1", &[]);
        let mut inverted = plain.clone();
        inverted.key = CommandKey::Resample {
            atlas: "A1".to_string(),
            template: "T1".to_string(),
            target: "X".to_string(),
            inverted: true,
        };

        let (unique, removed) = dedup(vec![plain, inverted]);
        assert_eq!(unique.len(), 2);
        assert_eq!(removed, 0);
    }
}
