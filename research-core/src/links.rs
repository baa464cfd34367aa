//! Local link integrity checks for generated HTML documents
//!
//! The research agent writes an HTML site into the project directory. Pages
//! routinely link to pages the agent has not written yet; this module finds
//! those dangling local references so progress can be held back until they
//! exist.
//!
//! The scan is read-only and never fails: unreadable documents are skipped.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Reference prefixes that never point at a local file
const EXTERNAL_PREFIXES: [&str; 6] = [
    "http://",
    "https://",
    "mailto:",
    "#",
    "data:",
    "javascript:",
];

/// Extension of the documents that are scanned
const DOCUMENT_GLOB: &str = "**/*.html";

fn link_attribute_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#"(?i)(?:href|src)=["']([^"']+)["']"#).expect("valid link attribute regex")
    })
}

/// Missing local references, keyed by document path relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingLinks {
    by_document: BTreeMap<String, Vec<String>>,
}

impl MissingLinks {
    pub fn is_empty(&self) -> bool {
        self.by_document.is_empty()
    }

    /// Number of documents with at least one missing reference
    pub fn document_count(&self) -> usize {
        self.by_document.len()
    }

    /// Total number of missing references across all documents
    pub fn total(&self) -> usize {
        self.by_document.values().map(Vec::len).sum()
    }

    /// Missing references for one document
    pub fn get(&self, document: &str) -> Option<&[String]> {
        self.by_document.get(document).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.by_document
            .iter()
            .map(|(doc, links)| (doc.as_str(), links.as_slice()))
    }

    /// Flat `document -> link` pairs, in document order
    pub fn pairs(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(doc, links)| links.iter().map(move |link| format!("{} -> {}", doc, link)))
            .collect()
    }

    fn insert(&mut self, document: String, links: Vec<String>) {
        self.by_document.insert(document, links);
    }
}

/// Extract the local references from an HTML document.
///
/// External schemes, fragments, `data:` and `javascript:` references are
/// ignored; query strings and fragments are stripped; the result is
/// de-duplicated.
pub fn extract_local_links(html: &str) -> BTreeSet<String> {
    let mut links = BTreeSet::new();

    for captures in link_attribute_regex().captures_iter(html) {
        let link = &captures[1];

        if EXTERNAL_PREFIXES.iter().any(|p| link.starts_with(p)) {
            continue;
        }
        if link.trim().is_empty() {
            continue;
        }

        let without_query = link.split('?').next().unwrap_or_default();
        let local = without_query.split('#').next().unwrap_or_default();
        if !local.is_empty() {
            links.insert(local.to_string());
        }
    }

    links
}

/// Resolve a reference found in `document` against the project root.
///
/// Root-relative references (`/style.css`) resolve from the project root,
/// everything else from the document's own directory.
fn resolve_link(project_root: &Path, document: &Path, link: &str) -> PathBuf {
    if let Some(stripped) = link.strip_prefix('/') {
        project_root.join(stripped.trim_start_matches('/'))
    } else {
        document
            .parent()
            .unwrap_or(project_root)
            .join(link)
    }
}

/// Discover every HTML document below the project root, in a stable order.
fn discover_documents(project_root: &Path) -> crate::error::Result<Vec<PathBuf>> {
    let root = glob::Pattern::escape(&project_root.to_string_lossy());
    let pattern = format!("{}/{}", root.trim_end_matches('/'), DOCUMENT_GLOB);

    let mut documents: Vec<PathBuf> = glob::glob(&pattern)?
        .flatten()
        .filter(|p| p.is_file())
        .collect();
    documents.sort();
    documents.dedup();
    Ok(documents)
}

/// Scan a project for HTML documents referencing local files that do not exist.
///
/// Documents without missing references are omitted. Documents that cannot
/// be read (permissions, invalid UTF-8) are skipped.
pub fn check_missing_files(project_root: &Path) -> MissingLinks {
    let mut missing = MissingLinks::default();

    let documents = match discover_documents(project_root) {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!(
                root = %project_root.display(),
                error = %e,
                "Document discovery failed, treating project as having no documents"
            );
            return missing;
        }
    };

    for document in documents {
        let content = match std::fs::read_to_string(&document) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(
                    document = %document.display(),
                    error = %e,
                    "Skipping unreadable document"
                );
                continue;
            }
        };

        let dangling: Vec<String> = extract_local_links(&content)
            .into_iter()
            .filter(|link| !resolve_link(project_root, &document, link).exists())
            .collect();

        if dangling.is_empty() {
            continue;
        }

        let relative = document
            .strip_prefix(project_root)
            .unwrap_or(&document)
            .to_string_lossy()
            .to_string();
        missing.insert(relative, dangling);
    }

    missing
}

/// Explanation shown when completion was blocked by missing files.
pub fn format_missing_files_error(missing: &MissingLinks, requested_percentage: i64) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", rule));
    out.push_str("CANNOT MARK AS COMPLETE - MISSING FILES!\n");
    out.push_str(&format!("{}\n\n", rule));
    out.push_str(&format!(
        "You tried to mark progress as {}%, but your HTML files\n",
        requested_percentage
    ));
    out.push_str(&format!(
        "reference {} file(s) that DO NOT EXIST.\n\n",
        missing.total()
    ));
    out.push_str("Progress has been CAPPED at 85% until you create these files:\n\n");

    for (document, links) in missing.iter() {
        out.push_str(&format!("  In {}:\n", document));
        for link in links {
            out.push_str(&format!("     {} - FILE DOES NOT EXIST\n", link));
        }
    }

    out.push_str(&format!("\n{}\n", rule));
    out.push_str("ACTION REQUIRED:\n");
    out.push_str("1. Create each missing file listed above using write_file()\n");
    out.push_str("2. Then call update_research_progress(100, ...) again\n");
    out.push_str(&format!("{}\n", rule));
    out
}

/// Non-blocking reminder shown while progress is still below the gate.
pub fn format_missing_files_warning(missing: &MissingLinks) -> String {
    let mut out =
        String::from("\n\nWARNING: Some HTML files reference files that don't exist yet:\n");
    for (document, links) in missing.iter() {
        out.push_str(&format!("    {}: {}\n", document, links.join(", ")));
    }
    out.push_str("Remember to create these files before marking complete!");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn links(html: &str) -> Vec<String> {
        extract_local_links(html).into_iter().collect()
    }

    #[test]
    fn test_extracts_href_and_src() {
        let html = r#"<a href="page.html">x</a><img src="img/logo.png">"#;
        assert_eq!(links(html), vec!["img/logo.png", "page.html"]);
    }

    #[test]
    fn test_ignores_external_and_pseudo_links() {
        let html = r##"
            <a href="https://example.com">a</a>
            <a href="http://example.com">b</a>
            <a href="mailto:me@example.com">c</a>
            <a href="#top">d</a>
            <img src="data:image/png;base64,AAAA">
            <a href="javascript:void(0)">e</a>
            <a href="javascript:openMenu('x')">f</a>
        "##;
        assert!(links(html).is_empty());
    }

    #[test]
    fn test_strips_query_and_fragment_and_dedupes() {
        let html = concat!(
            r#"<a href="a.html?x=1#s">1</a>"#,
            r#"<a href='a.html'>2</a>"#,
            r#"<a href="a.html#intro">3</a>"#,
        );
        assert_eq!(links(html), vec!["a.html"]);
        // Extraction is stable when applied again
        assert_eq!(links(html), links(html));
    }

    #[test]
    fn test_query_only_reference_is_dropped() {
        assert!(links(r#"<a href="?page=2">next</a>"#).is_empty());
    }

    #[test]
    fn test_case_insensitive_attributes_and_quotes() {
        let html = r#"<A HREF='one.html'>1</A><IMG SRC="two.png"><a Href="three.html">3</a>"#;
        assert_eq!(links(html), vec!["one.html", "three.html", "two.png"]);
    }

    #[test]
    fn test_whitespace_only_reference_is_ignored() {
        assert!(links(r#"<a href="   ">blank</a>"#).is_empty());
        assert!(links(r#"<a href="">empty</a>"#).is_empty());
    }

    #[test]
    fn test_keeps_relative_and_absolute_paths() {
        let html = concat!(
            r#"<a href="./a.html">a</a>"#,
            r#"<a href="../b.html">b</a>"#,
            r#"<a href="/css/site.css">c</a>"#,
        );
        assert_eq!(links(html), vec!["../b.html", "./a.html", "/css/site.css"]);
    }

    #[test]
    fn test_detects_missing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), r#"<a href="missing.html">m</a>"#).unwrap();

        let missing = check_missing_files(dir.path());
        assert_eq!(missing.get("index.html"), Some(&["missing.html".to_string()][..]));
        assert_eq!(missing.total(), 1);
        assert_eq!(missing.pairs(), vec!["index.html -> missing.html"]);
    }

    #[test]
    fn test_existing_targets_are_not_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), r#"<a href="page2.html">2</a>"#).unwrap();
        fs::write(dir.path().join("page2.html"), "<p>content</p>").unwrap();

        assert!(check_missing_files(dir.path()).is_empty());
    }

    #[test]
    fn test_resolves_relative_to_document_directory() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("reports");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("detail.html"), "<p>detail</p>").unwrap();
        fs::write(
            sub.join("index.html"),
            r#"<a href="detail.html">d</a><a href="../home.html">h</a>"#,
        )
        .unwrap();

        let missing = check_missing_files(dir.path());
        assert_eq!(missing.get("reports/index.html"), Some(&["../home.html".to_string()][..]));
        assert_eq!(missing.total(), 1);
    }

    #[test]
    fn test_resolves_root_relative_links_from_project_root() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("pages");
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        fs::write(
            sub.join("a.html"),
            r#"<link href="/css/site.css"><script src="/js/app.js"></script>"#,
        )
        .unwrap();

        let missing = check_missing_files(dir.path());
        assert_eq!(missing.get("pages/a.html"), Some(&["/js/app.js".to_string()][..]));
    }

    #[test]
    fn test_deeply_nested_documents_are_scanned() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("deep.html"), r#"<a href="missing.html">m</a>"#).unwrap();

        let missing = check_missing_files(dir.path());
        assert!(missing.iter().any(|(doc, _)| doc.ends_with("deep.html")));
    }

    #[test]
    fn test_projects_without_html_or_local_links() {
        let dir = TempDir::new().unwrap();
        assert!(check_missing_files(dir.path()).is_empty());

        fs::write(dir.path().join("README.md"), "[x](missing.html)").unwrap();
        assert!(check_missing_files(dir.path()).is_empty());

        fs::write(
            dir.path().join("index.html"),
            r#"<a href="https://example.com">e</a><a href="mailto:a@b.c">m</a>"#,
        )
        .unwrap();
        assert!(check_missing_files(dir.path()).is_empty());
    }

    #[test]
    fn test_unreadable_document_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("binary.html"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
        fs::write(dir.path().join("index.html"), r#"<a href="gone.html">g</a>"#).unwrap();

        let missing = check_missing_files(dir.path());
        assert_eq!(missing.document_count(), 1);
        assert!(missing.get("binary.html").is_none());
    }

    #[test]
    fn test_format_messages_list_every_missing_link() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("index.html"),
            r#"<a href="a.html">a</a><a href="b.html">b</a>"#,
        )
        .unwrap();
        let missing = check_missing_files(dir.path());

        let error = format_missing_files_error(&missing, 100);
        assert!(error.contains("CANNOT MARK AS COMPLETE"));
        assert!(error.contains("mark progress as 100%"));
        assert!(error.contains("reference 2 file(s)"));
        assert!(error.contains("a.html - FILE DOES NOT EXIST"));

        let warning = format_missing_files_warning(&missing);
        assert!(warning.contains("index.html: a.html, b.html"));
    }
}
