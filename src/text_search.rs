//! Phrase search over raw object bytes

use crate::error::{PatcherError, Result};
use crate::object_handler::{ExportMode, ObjectHandler};
use crate::worker;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use unity_patcher_binary::ObjectHandle;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Default report written by `search --log`
pub const SEARCH_LOG: &str = "search_log.txt";

/// Decode as UTF-8 (invalid bytes dropped), collapse whitespace runs into
/// one space, trim, and lowercase unless `case_sensitive`
pub fn normalize(data: &[u8], case_sensitive: bool) -> String {
    let text: String = String::from_utf8_lossy(data)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text.trim();
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

/// Undo `\n`, `\t`, `\\`, `\"` and `\uXXXX` escapes of a phrase file line
pub fn unescape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// The search argument, or the lines of the file it names
pub fn read_phrases(argument: &str) -> Result<Vec<String>> {
    let path = Path::new(argument);
    if !path.is_file() {
        return Ok(vec![argument.to_string()]);
    }
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(|line| unescape(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// Normalized phrases with their matchers
#[derive(Debug)]
pub struct SearchQuery {
    case_sensitive: bool,
    phrases: Vec<(String, Regex)>,
}

impl SearchQuery {
    pub fn new(phrases: &[String], case_sensitive: bool, whole_string: bool) -> Result<Self> {
        let mut compiled = Vec::new();
        for phrase in phrases {
            let phrase = normalize(phrase.as_bytes(), case_sensitive);
            if phrase.is_empty() {
                continue;
            }
            let escaped = regex::escape(&phrase);
            let pattern = if whole_string {
                format!(r"\b{}\b", escaped)
            } else {
                escaped
            };
            let regex = Regex::new(&pattern)
                .map_err(|e| PatcherError::unsupported(format!("Invalid search phrase {:?}: {}", phrase, e)))?;
            compiled.push((phrase, regex));
        }
        Ok(Self {
            case_sensitive,
            phrases: compiled,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Phrases present in `data`
    pub fn find(&self, data: &[u8]) -> Vec<String> {
        let text = normalize(data, self.case_sensitive);
        self.phrases
            .iter()
            .filter(|(_, regex)| regex.is_match(&text))
            .map(|(phrase, _)| phrase.clone())
            .collect()
    }
}

pub struct SearchResult {
    pub object: ObjectHandle,
    pub found_text: Vec<String>,
}

/// Objects whose raw bytes contain at least one phrase
pub fn search(objects: &[ObjectHandle], query: &SearchQuery, threads: Option<usize>) -> Result<Vec<SearchResult>> {
    let results = Mutex::new(Vec::new());
    let progress = worker::progress_bar(objects.len());

    worker::run(objects.iter().collect(), threads, |object: &ObjectHandle| {
        match object.raw_data() {
            Ok(data) => {
                let found_text = query.find(&data);
                if !found_text.is_empty() {
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(SearchResult {
                            object: object.clone(),
                            found_text,
                        });
                }
            }
            Err(e) => tracing::debug!("Can't read #{}: {}", object.path_id(), e),
        }
        progress.inc(1);
    })?;
    progress.finish_and_clear();

    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by(|a, b| {
        (a.object.assets_file_name(), a.object.path_id()).cmp(&(b.object.assets_file_name(), b.object.path_id()))
    });
    Ok(results)
}

/// Export every hit and list the scripts they belong to
pub fn export_results(handler: &ObjectHandler, results: &[SearchResult], mode: ExportMode) {
    let mut scripts = BTreeSet::new();
    for result in results {
        if let Some(script) = handler.manager_for(&result.object).script_name() {
            scripts.insert(script);
        }
        handler.export(&result.object, mode, false);
    }
    handler.statistics().print_summary();
    if !scripts.is_empty() {
        tracing::info!("\n[INF] Scripts: {}", scripts.into_iter().collect::<Vec<_>>().join(", "));
    }
}

/// Report of every hit: object metadata and the phrases found in it
pub fn format_log(handler: &ObjectHandler, results: &[SearchResult]) -> String {
    let mut scripts = BTreeSet::new();
    let mut log = String::new();
    for result in results {
        let manager = handler.manager_for(&result.object);
        let script = manager.script_name();
        let _ = write!(log, "{}\n\n[Found Texts]\n", manager.base().describe(script.as_deref()));
        for text in &result.found_text {
            let _ = writeln!(log, "- {}", text);
        }
        let _ = write!(log, "\n{}\n\n", "=".repeat(40));
        scripts.extend(script);
    }
    if !scripts.is_empty() {
        log.push_str("Scripts: ");
        log.push_str(&scripts.into_iter().collect::<Vec<_>>().join(", "));
    }
    log
}

pub fn log_results(handler: &ObjectHandler, results: &[SearchResult], path: &Path) -> Result<()> {
    std::fs::write(path, format_log(handler, results))?;
    tracing::info!("\n[INF] Successfully saved log: {}", path.display());
    Ok(())
}
