use anyhow::Error;
use std::fs;
use std::path::Path;

/// Section of pipeline.toml owned by this tool. The three managed keys are
/// rewritten on every run; everything else in the file is preserved verbatim.
pub const PIPELINE_SECTION: &str = "1337.uint";

const MANAGED_KEYS: [&str; 3] = ["pipeline_start_ts", "pipeline_end_ts", "fork_start_block"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkWindow {
    pub start_ts: u64,
    pub end_ts: u64,
    pub fork_start_block: u64,
}

struct Section {
    header: String,
    lines: Vec<String>,
}

impl Section {
    fn name(&self) -> &str {
        self.header
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
    }
}

/// Line-oriented document model: an ordered preamble plus ordered sections,
/// each holding its lines verbatim. Edits are targeted at the pipeline
/// section; rendering reproduces every untouched line byte-for-byte.
struct TomlDocument {
    preamble: Vec<String>,
    sections: Vec<Section>,
    trailing_newline: bool,
}

impl TomlDocument {
    fn parse(text: &str) -> Self {
        let trailing_newline = text.is_empty() || text.ends_with('\n');
        let mut preamble = Vec::new();
        let mut sections: Vec<Section> = Vec::new();

        for line in text.lines() {
            if is_section_header(line) {
                sections.push(Section {
                    header: line.to_string(),
                    lines: Vec::new(),
                });
            } else if let Some(section) = sections.last_mut() {
                section.lines.push(line.to_string());
            } else {
                preamble.push(line.to_string());
            }
        }

        Self {
            preamble,
            sections,
            trailing_newline,
        }
    }

    fn render(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        for line in &self.preamble {
            lines.push(line);
        }
        for section in &self.sections {
            lines.push(&section.header);
            for line in &section.lines {
                lines.push(line);
            }
        }

        let mut out = lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Replaces the three managed keys in the pipeline section, creating the
    /// section at the end of the document if it does not exist yet. First
    /// matching header wins when the section is duplicated.
    fn upsert_fork_window(&mut self, window: &ForkWindow) {
        let assignments = [
            format!("pipeline_start_ts = {}", window.start_ts),
            format!("pipeline_end_ts = {}", window.end_ts),
            format!("fork_start_block = {}", window.fork_start_block),
        ];

        let index = match self
            .sections
            .iter()
            .position(|s| s.name() == PIPELINE_SECTION)
        {
            Some(index) => index,
            None => {
                self.push_blank_separator();
                self.sections.push(Section {
                    header: format!("[{PIPELINE_SECTION}]"),
                    lines: Vec::new(),
                });
                self.sections.len() - 1
            }
        };

        let section = &mut self.sections[index];
        section.lines.retain(|line| !is_managed_assignment(line));

        // Insert after the last non-blank line so blank separators before a
        // following section stay where they were.
        let insert_at = section
            .lines
            .iter()
            .rposition(|line| !line.trim().is_empty())
            .map_or(0, |i| i + 1);
        for (offset, line) in assignments.into_iter().enumerate() {
            section.lines.insert(insert_at + offset, line);
        }
    }

    /// Leaves exactly one blank line after the current document content,
    /// or none when the document is empty.
    fn push_blank_separator(&mut self) {
        let has_sections = !self.sections.is_empty();
        let lines = match self.sections.last_mut() {
            Some(section) => &mut section.lines,
            None => &mut self.preamble,
        };
        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }
        if has_sections || !lines.is_empty() {
            lines.push(String::new());
        }
    }
}

fn is_section_header(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('[') && trimmed.ends_with(']')
}

fn is_managed_assignment(line: &str) -> bool {
    let trimmed = line.trim_start();
    MANAGED_KEYS.iter().any(|key| {
        trimmed
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='))
    })
}

/// Rewrites the fork window in the document at `path`. The file is read and
/// written whole; this is the only write the tool performs, so any earlier
/// failure leaves the file untouched.
pub fn write_fork_window(path: &Path, window: &ForkWindow) -> Result<(), Error> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;

    let mut document = TomlDocument::parse(&text);
    document.upsert_fork_window(window);

    fs::write(path, document.render())
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))
}
