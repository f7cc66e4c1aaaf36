//! Corpus loading: one corpus per file in the corpus folder.
//!
//! The file stem names the corpus (`policies.md` → `policies`). Supported
//! formats: `.json` (array of entries), `.jsonl`, `.yaml`/`.yml`, `.md` (one
//! entry per heading section) and `.txt` (one entry per paragraph).

use std::collections::BTreeMap;
use std::path::Path;

use pulldown_cmark::{Event, Parser as CmarkParser, Tag, TagEnd};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{CitypulseError, Result};
use crate::retrieval::CorpusEntry;

/// Entry as written on disk; `id` is optional.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

fn finish(corpus: &str, raw: Vec<RawEntry>) -> Vec<CorpusEntry> {
    raw.into_iter()
        .enumerate()
        .filter(|(_, r)| !r.text.trim().is_empty())
        .map(|(idx, r)| CorpusEntry {
            id: r.id.unwrap_or_else(|| format!("{}-{}", corpus, idx + 1)),
            text: r.text.trim().to_string(),
            metadata: r.metadata,
            embedding: r.embedding,
        })
        .collect()
}

/// Parse corpus file content according to its extension.
pub fn parse_corpus(corpus: &str, extension: &str, content: &str) -> Result<Vec<CorpusEntry>> {
    match extension {
        "json" => {
            let raw: Vec<RawEntry> = serde_json::from_str(content)?;
            Ok(finish(corpus, raw))
        }
        "jsonl" => {
            let mut raw = Vec::new();
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let entry: RawEntry = serde_json::from_str(line).map_err(|e| {
                    CitypulseError::Parse(format!("{}.jsonl line {}: {}", corpus, line_no + 1, e))
                })?;
                raw.push(entry);
            }
            Ok(finish(corpus, raw))
        }
        "yaml" | "yml" => {
            let raw: Vec<RawEntry> = serde_yaml_ng::from_str(content)?;
            Ok(finish(corpus, raw))
        }
        "md" => Ok(parse_markdown_sections(corpus, content)),
        "txt" => Ok(paragraphs(content)
            .into_iter()
            .enumerate()
            .map(|(idx, p)| CorpusEntry::new(format!("{}-{}", corpus, idx + 1), p))
            .collect()),
        other => Err(CitypulseError::Parse(format!(
            "unsupported corpus format '.{}' for corpus {}",
            other, corpus
        ))),
    }
}

/// Paragraphs separated by blank lines; `lines()` also strips CRLF endings.
fn paragraphs(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n").trim().to_string());
    }
    out
}

/// Split markdown into one entry per heading section; the heading is kept in
/// the entry's `section` metadata.
fn parse_markdown_sections(corpus: &str, content: &str) -> Vec<CorpusEntry> {
    let mut sections: Vec<(Option<String>, String)> = Vec::new();
    let mut header: Option<String> = None;
    let mut body = String::new();
    let mut in_heading = false;
    let mut heading_text = String::new();

    for event in CmarkParser::new(content) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                if !body.trim().is_empty() {
                    sections.push((header.take(), body.trim().to_string()));
                }
                body.clear();
                heading_text.clear();
                in_heading = true;
            }
            Event::End(TagEnd::Heading(_)) => {
                header = Some(heading_text.trim().to_string());
                in_heading = false;
            }
            Event::Text(text) | Event::Code(text) => {
                if in_heading {
                    heading_text.push_str(&text);
                } else {
                    body.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => body.push(' '),
            Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => body.push(' '),
            _ => {}
        }
    }
    if !body.trim().is_empty() {
        sections.push((header, body.trim().to_string()));
    }

    sections
        .into_iter()
        .enumerate()
        .map(|(idx, (section, text))| {
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            let mut entry = CorpusEntry::new(format!("{}-{}", corpus, idx + 1), text);
            if let Some(section) = section {
                entry
                    .metadata
                    .insert("section".to_string(), serde_json::Value::String(section));
            }
            entry
        })
        .collect()
}

/// Load every corpus file directly inside `dir`.
///
/// Hidden files and unknown extensions are skipped. Two files with the same
/// stem are rejected.
pub fn load_corpora(dir: &Path) -> Result<BTreeMap<String, Vec<CorpusEntry>>> {
    if !dir.is_dir() {
        return Err(CitypulseError::Config(format!(
            "corpus_dir is not a directory: {}",
            dir.display()
        )));
    }

    let mut corpora = BTreeMap::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if !stem.starts_with('.') => stem.to_string(),
            _ => continue,
        };
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !matches!(extension.as_str(), "json" | "jsonl" | "yaml" | "yml" | "md" | "txt") {
            log::debug!("Skipping non-corpus file {}", path.display());
            continue;
        }
        if corpora.contains_key(&name) {
            return Err(CitypulseError::Parse(format!(
                "corpus '{}' is defined by more than one file in {}",
                name,
                dir.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let entries = parse_corpus(&name, &extension, &content)?;
        log::info!("Loaded corpus '{}' from {} ({} entries)", name, path.display(), entries.len());
        corpora.insert(name, entries);
    }

    Ok(corpora)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_json_assigns_missing_ids() {
        let entries = parse_corpus(
            "cases",
            "json",
            r#"[{"id": "c-7", "text": "Bus collision"}, {"text": "Fog on bridge", "metadata": {"severity": "high"}}, {"text": "  "}]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "c-7");
        assert_eq!(entries[1].id, "cases-2");
        assert_eq!(entries[1].metadata["severity"], "high");
    }

    #[test]
    fn test_parse_jsonl_reports_line() {
        let err = parse_corpus("cases", "jsonl", "{\"text\": \"ok\"}\n\n{broken\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_yaml() {
        let entries = parse_corpus("p", "yaml", "- text: Extend green\n- id: x\n  text: Rebalance\n").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].id, "x");
    }

    #[test]
    fn test_parse_markdown_sections() {
        let md = "# Signal Policies\n\n## Critical incidents\nRoute the ambulance to the\nnearest hospital.\n\n## Congestion\n- Extend green\n- Rebalance `timing`\n";
        let entries = parse_corpus("policies", "md", md).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].metadata["section"], "Critical incidents");
        assert_eq!(entries[0].text, "Route the ambulance to the nearest hospital.");
        assert_eq!(entries[1].metadata["section"], "Congestion");
        assert!(entries[1].text.contains("Extend green"));
        assert!(entries[1].text.contains("timing"));
    }

    #[test]
    fn test_parse_txt_paragraphs() {
        let entries = parse_corpus("notes", "txt", "First note.\n\nSecond note\nspans lines.\n\n\n").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].id, "notes-2");
    }

    #[test]
    fn test_parse_txt_crlf_paragraphs() {
        let content = "First note.\r\n\r\nSecond note\r\nspans lines.\r\n \r\nThird.\r\n";
        let entries = parse_corpus("notes", "txt", content).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].text, "Second note\nspans lines.");
        assert_eq!(entries[2].text, "Third.");
    }

    #[test]
    fn test_load_corpora_from_folder() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("incident_cases.json"),
            r#"[{"text": "Collision at INT_4"}]"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("policies.md"), "## Rule\nExtend green.\n").unwrap();
        fs::write(temp_dir.path().join("README.csv"), "ignored").unwrap();
        fs::write(temp_dir.path().join(".hidden.json"), "[]").unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("nested").join("deep.json"), "[]").unwrap();

        let corpora = load_corpora(temp_dir.path()).unwrap();
        let names: Vec<&String> = corpora.keys().collect();
        assert_eq!(names, vec!["incident_cases", "policies"]);
        assert_eq!(corpora["policies"][0].text, "Extend green.");
    }

    #[test]
    fn test_load_corpora_duplicate_stem() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("policies.md"), "Extend green.\n").unwrap();
        fs::write(temp_dir.path().join("policies.txt"), "Rebalance.\n").unwrap();
        assert!(matches!(load_corpora(temp_dir.path()), Err(CitypulseError::Parse(_))));
    }

    #[test]
    fn test_load_corpora_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(matches!(load_corpora(&missing), Err(CitypulseError::Config(_))));
    }

    #[test]
    fn test_bundled_sample_corpora() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join("corpora");
        let corpora = load_corpora(&dir).unwrap();
        assert_eq!(corpora["incident_cases"].len(), 6);
        assert_eq!(corpora["policies"].len(), 5);
        assert_eq!(corpora["policies"][3].metadata["section"], "No hospital route available");
    }
}
