//! Trusted template sources: filesystem paths, template text, and the
//! filesystem abstraction behind `parse_fs`.
//!
//! Trust in these types derives from where the value came from: a
//! compile-time constant, a value assembled from constants, or the
//! process environment, never from user input.

use crate::error::{Error, ErrorCode};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A filesystem path from a trusted origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrustedSource {
    s: String,
}

impl TrustedSource {
    pub fn from_constant(s: &'static str) -> TrustedSource {
        TrustedSource { s: s.to_string() }
    }

    /// Read the value of `name` from the process environment. Trust
    /// derives from operator control of the environment.
    pub fn from_env_var(name: &str) -> TrustedSource {
        TrustedSource {
            s: std::env::var(name).unwrap_or_default(),
        }
    }

    /// Join a constant directory, a trusted sub-path and a filename.
    /// The filename may not contain path or list separators and may not
    /// be the special name `..`.
    pub fn from_constant_dir(
        dir: &'static str,
        src: TrustedSource,
        filename: &str,
    ) -> Result<TrustedSource, Error> {
        if filename == ".." {
            return Err(Error::new(
                ErrorCode::Io,
                "filename must not be the special name \"..\"",
            ));
        }
        if filename.contains('/') || filename.contains('\\') {
            return Err(Error::new(
                ErrorCode::Io,
                format!("filename {filename:?} must not contain the separator '/'"),
            ));
        }
        if filename.contains(':') {
            return Err(Error::new(
                ErrorCode::Io,
                format!("filename {filename:?} must not contain the separator ':'"),
            ));
        }
        let mut parts: Vec<&str> = Vec::new();
        for p in [dir, src.as_str(), filename] {
            if !p.is_empty() {
                parts.push(p);
            }
        }
        Ok(TrustedSource {
            s: clean_path(&parts.join("/")),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for TrustedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

/// Join trusted sources with `/`, cleaning `.` and `..` segments the
/// way a lexical path join does.
pub fn trusted_source_join(srcs: &[TrustedSource]) -> TrustedSource {
    let joined = srcs
        .iter()
        .map(TrustedSource::as_str)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    TrustedSource { s: clean_path(&joined) }
}

pub(crate) fn raw_trusted_source(s: impl Into<String>) -> TrustedSource {
    TrustedSource { s: s.into() }
}

/// Lexically clean a `/`-separated path: collapse separators and
/// resolve `.` and `..` segments.
fn clean_path(p: &str) -> String {
    let rooted = p.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for seg in p.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|s| *s != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            _ => out.push(seg),
        }
    }
    let mut s = out.join("/");
    if rooted {
        s.insert(0, '/');
    }
    if s.is_empty() {
        ".".to_string()
    } else {
        s
    }
}

/// Template source text from a trusted origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrustedTemplate {
    s: String,
}

impl TrustedTemplate {
    pub fn from_constant(s: &'static str) -> TrustedTemplate {
        TrustedTemplate { s: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for TrustedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_trusted_template(s: impl Into<String>) -> TrustedTemplate {
    TrustedTemplate { s: s.into() }
}

/// A template filesystem: a directory root or a set of embedded
/// entries.
#[derive(Debug, Clone)]
pub struct TrustedFS {
    inner: FsInner,
}

#[derive(Debug, Clone)]
enum FsInner {
    Dir(PathBuf),
    Mem(BTreeMap<String, String>),
}

/// A filesystem rooted at a trusted directory path.
pub fn trusted_fs_from_trusted_source(root: TrustedSource) -> TrustedFS {
    TrustedFS {
        inner: FsInner::Dir(PathBuf::from(root.as_str())),
    }
}

/// A filesystem of embedded `(name, contents)` entries, the analog of
/// compiling template files into the binary.
pub fn trusted_fs_from_entries(entries: &[(&str, &str)]) -> TrustedFS {
    TrustedFS {
        inner: FsInner::Mem(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
    }
}

impl TrustedFS {
    pub(crate) fn read(&self, name: &str) -> Result<String, Error> {
        match &self.inner {
            FsInner::Dir(root) => std::fs::read_to_string(root.join(name))
                .map_err(|e| Error::new(ErrorCode::Io, format!("{name}: {e}"))),
            FsInner::Mem(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| Error::new(ErrorCode::Io, format!("{name}: file does not exist"))),
        }
    }

    pub(crate) fn glob(&self, pattern: &str) -> Result<Vec<String>, Error> {
        match &self.inner {
            FsInner::Dir(root) => {
                let names = list_dir(root)?;
                Ok(filter_glob(names, pattern))
            }
            FsInner::Mem(map) => Ok(filter_glob(map.keys().cloned().collect(), pattern)),
        }
    }
}

fn list_dir(root: &PathBuf) -> Result<Vec<String>, Error> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| Error::new(ErrorCode::Io, format!("{}: {e}", root.display())))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::new(ErrorCode::Io, e.to_string()))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

fn filter_glob(mut names: Vec<String>, pattern: &str) -> Vec<String> {
    names.sort();
    names.retain(|n| glob_match(pattern, n));
    names
}

/// Shell-style matching with `*`, `?` and `[a-z]` character classes.
pub(crate) fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    glob_match_at(&p, &n)
}

fn glob_match_at(p: &[char], n: &[char]) -> bool {
    if p.is_empty() {
        return n.is_empty();
    }
    match p[0] {
        '*' => {
            for skip in 0..=n.len() {
                if glob_match_at(&p[1..], &n[skip..]) {
                    return true;
                }
            }
            false
        }
        '?' => !n.is_empty() && glob_match_at(&p[1..], &n[1..]),
        '[' => {
            let close = match p.iter().position(|&c| c == ']') {
                Some(i) if i > 0 => i,
                _ => return false,
            };
            if n.is_empty() {
                return false;
            }
            let (class, negate) = if p[1] == '!' {
                (&p[2..close], true)
            } else {
                (&p[1..close], false)
            };
            let mut matched = false;
            let mut i = 0;
            while i < class.len() {
                if i + 2 < class.len() && class[i + 1] == '-' {
                    if (class[i]..=class[i + 2]).contains(&n[0]) {
                        matched = true;
                    }
                    i += 3;
                } else {
                    if class[i] == n[0] {
                        matched = true;
                    }
                    i += 1;
                }
            }
            if matched == negate {
                return false;
            }
            glob_match_at(&p[close + 1..], &n[1..])
        }
        c => !n.is_empty() && n[0] == c && glob_match_at(&p[1..], &n[1..]),
    }
}

/// Split a glob pattern into its directory part and file pattern.
pub(crate) fn split_glob_pattern(pattern: &str) -> (&str, &str) {
    match pattern.rfind('/') {
        Some(i) => (&pattern[..i], &pattern[i + 1..]),
        None => ("", pattern),
    }
}

/// Base name of a `/`-separated path.
pub(crate) fn base_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_constant_round_trips() {
        assert_eq!(TrustedSource::from_constant("foo").as_str(), "foo");
        assert_eq!(TrustedTemplate::from_constant("{{.}}").as_str(), "{{.}}");
    }

    #[test]
    fn from_constant_dir() {
        let c = TrustedSource::from_constant;
        for (dir, src, filename, want, err) in [
            ("foo/", c(""), "file", "foo/file", ""),
            ("foo/", TrustedSource::default(), "file", "foo/file", ""),
            ("", c("foo/"), "file", "foo/file", ""),
            ("foo", c("bar"), "file", "foo/bar/file", ""),
            ("foo/bar", c("baz"), "file.html", "foo/bar/baz/file.html", ""),
            ("foo", c("bar"), "dir:otherPath", "", "must not contain the separator ':'"),
            ("foo", c("bar"), "dir/file.html", "", "must not contain the separator '/'"),
            ("foo", c("bar"), "../file.html", "", "must not contain the separator '/'"),
            ("foo/bar", c("baz"), "..", "", "must not be the special name \"..\""),
        ] {
            match TrustedSource::from_constant_dir(dir, src, filename) {
                Ok(ts) => {
                    assert!(err.is_empty(), "{dir} {filename}: expected error");
                    assert_eq!(ts.as_str(), want, "{dir} {filename}");
                }
                Err(e) => {
                    assert!(!err.is_empty(), "{dir} {filename}: unexpected error {e}");
                    assert!(e.description.contains(err), "{}", e.description);
                }
            }
        }
    }

    #[test]
    fn join_cleans_dot_segments() {
        let c = TrustedSource::from_constant;
        assert_eq!(
            trusted_source_join(&[c("foo"), c("bar/"), c("/baz"), c("/far")]).as_str(),
            "foo/bar/baz/far"
        );
        assert_eq!(
            trusted_source_join(&[c("foo"), c("bar/."), c("./baz")]).as_str(),
            "foo/bar/baz"
        );
        assert_eq!(
            trusted_source_join(&[c("foo"), c("bar"), c("baz/.."), c("../far")]).as_str(),
            "foo/far"
        );
    }

    #[test]
    fn env_var_source() {
        std::env::set_var("VELLUM_TEST_TMPDIR", "/my/tmp");
        assert_eq!(TrustedSource::from_env_var("VELLUM_TEST_TMPDIR").as_str(), "/my/tmp");
        std::env::remove_var("VELLUM_TEST_TMPDIR");
        assert_eq!(TrustedSource::from_env_var("VELLUM_TEST_TMPDIR").as_str(), "");
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("T*.tmpl", "T1.tmpl"));
        assert!(glob_match("*.tmpl", "a.tmpl"));
        assert!(!glob_match("*.tmpl", "a.html"));
        assert!(glob_match("file?.txt", "file1.txt"));
        assert!(glob_match("[a-c]x", "bx"));
        assert!(!glob_match("[a-c]x", "dx"));
        assert!(glob_match("[!a-c]x", "dx"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn mem_fs_read_and_glob() {
        let fs = trusted_fs_from_entries(&[("a.tmpl", "A"), ("b.tmpl", "B"), ("c.txt", "C")]);
        assert_eq!(fs.read("a.tmpl").expect("read"), "A");
        assert!(fs.read("missing").is_err());
        assert_eq!(fs.glob("*.tmpl").expect("glob"), vec!["a.tmpl", "b.tmpl"]);
    }
}
