//! Text and file system helpers shared across the pipeline.
//!
//! - Truncation of long payloads before logging
//! - Capitalization and whitespace normalization
//! - Escaping and entity rendering for Telegram's legacy Markdown
//! - Output directory validation for the run report

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last character boundary before `max` bytes
/// and suffixed with the number of bytes left out.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Capitalize the first character of a string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(upcase("octobre"), "Octobre");
/// assert_eq!(upcase(""), "");
/// ```
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Join lines into one paragraph with single spaces and a closing full stop.
///
/// Text that already ends with `.`, `!`, `?` or `…` keeps its punctuation.
pub fn normalize_paragraph(text: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        return joined;
    }
    if joined.ends_with(['.', '!', '?', '…']) {
        joined
    } else {
        format!("{joined}.")
    }
}

fn is_markup(c: char) -> bool {
    matches!(c, '_' | '*' | '`' | '[')
}

/// Escape the characters Telegram's legacy Markdown treats as markup.
///
/// Only valid outside entities: legacy Markdown has no escaping inside
/// `*bold*` or `[label](url)`. Use [`markdown_bold`] and [`plain_label`] there.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if is_markup(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render text in bold for legacy Markdown.
///
/// Markup characters cannot appear inside the entity, so the bold run is
/// closed before each of them and reopened after, the way Telegram renders
/// `*2*\**2=4*`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(markdown_bold("Label_Vie"), "*Label*\\_*Vie*");
/// ```
pub fn markdown_bold(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut run = String::new();
    for c in s.chars() {
        if is_markup(c) {
            if !run.is_empty() {
                out.push('*');
                out.push_str(&std::mem::take(&mut run));
                out.push('*');
            }
            out.push('\\');
            out.push(c);
        } else {
            run.push(c);
        }
    }
    if !run.is_empty() {
        out.push('*');
        out.push_str(&run);
        out.push('*');
    }
    out
}

/// Drop markup characters from text placed inside a link label.
pub fn plain_label(s: &str) -> String {
    s.chars()
        .filter(|c| !is_markup(*c) && *c != ']')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Make free-form generated prose safe for legacy Markdown.
///
/// Emphasis asterisks are dropped; remaining markup characters are escaped.
pub fn markdown_prose(s: &str) -> String {
    escape_markdown(&s.replace('*', ""))
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    let scratch_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "é".repeat(10);
        let result = truncate_for_log(&s, 5);
        assert!(result.starts_with("éé…"));
    }

    #[test]
    fn test_upcase() {
        assert_eq!(upcase("octobre"), "Octobre");
        assert_eq!(upcase("écrit"), "Écrit");
        assert_eq!(upcase(""), "");
    }

    #[test]
    fn test_normalize_paragraph() {
        assert_eq!(
            normalize_paragraph("Le groupe publie\n  ses comptes\n"),
            "Le groupe publie ses comptes."
        );
        assert_eq!(normalize_paragraph("Déjà fini !"), "Déjà fini !");
        assert_eq!(normalize_paragraph("  \n "), "");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("Label_Vie *record*"), "Label\\_Vie \\*record\\*");
        assert_eq!(escape_markdown("Résultats [T3]"), "Résultats \\[T3]");
    }

    /// Count markup characters not preceded by a backslash.
    fn unescaped(s: &str, markup: char) -> usize {
        let chars: Vec<char> = s.chars().collect();
        (0..chars.len())
            .filter(|&i| chars[i] == markup && (i == 0 || chars[i - 1] != '\\'))
            .count()
    }

    #[test]
    fn test_markdown_bold_reopens_around_markup() {
        assert_eq!(markdown_bold("OCP lève 5 MMDH"), "*OCP lève 5 MMDH*");
        assert_eq!(markdown_bold("Label_Vie *record*"), "*Label*\\_*Vie *\\**record*\\*");
        assert_eq!(markdown_bold("_"), "\\_");
        let bold = markdown_bold("a*b_c`d[e");
        assert_eq!(unescaped(&bold, '*') % 2, 0);
        assert_eq!(unescaped(&bold, '_'), 0);
    }

    #[test]
    fn test_plain_label_strips_markup() {
        assert_eq!(plain_label("Le_Boursier [Médias24]"), "LeBoursier Médias24");
    }

    #[test]
    fn test_markdown_prose_leaves_no_open_entity() {
        let prose = markdown_prose("* Point clé: **emprunt** de 5 MMDH Taux_fixe de `4%` [sic]");
        assert_eq!(unescaped(&prose, '*'), 0);
        assert_eq!(unescaped(&prose, '_'), 0);
        assert_eq!(unescaped(&prose, '`'), 0);
        assert_eq!(unescaped(&prose, '['), 0);
        assert!(prose.contains("Taux\\_fixe"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("reports/daily");
        let path = nested.to_str().unwrap();
        ensure_writable_dir(path).await.unwrap();
        assert!(nested.is_dir());
    }
}
